use super::artifact::DeploymentArtifact;
use super::grant::PrivilegeGrant;
use super::payload::{RelaySource, UPLOAD_CHUNK_CHARS};
use crate::control_surface::{CompileStatus, EntryPoint};
use crate::error_handling::types::{ControlError, RemoteError};
use crate::session_management::ControlSession;
use log::{debug, error, info};

/// Top-level procedure that starts the relay listener.
pub const ENTRY_PROCEDURE: &str = "start_socks5";

/// Grants the runtime permissions the relay needs for `port`.
pub fn grant(session: &mut ControlSession, port: u16) -> Result<(), ControlError> {
    let profile = session.profile();
    let grant = PrivilegeGrant::for_listener(&profile.principal(), &profile.host, port);
    info!(
        "Granting {} runtime permissions to {}",
        grant.permissions().len(),
        grant.principal()
    );
    grant.apply(session.surface_mut())
}

/// Uploads and compiles `source`, then checks its catalog status.
///
/// A status other than valid fails with [`ControlError::Compilation`]
/// carrying every compiler diagnostic, one per line, in catalog order.
pub fn deploy(
    session: &mut ControlSession,
    source: &RelaySource,
) -> Result<DeploymentArtifact, ControlError> {
    let name = source.class_name();
    let chunks = source.chunks(UPLOAD_CHUNK_CHARS);
    let mut artifact = DeploymentArtifact::pending(name, chunks.len());
    info!(
        "Uploading relay source {} ({} bytes, {} chunks)",
        name,
        source.text().len(),
        artifact.chunk_count()
    );

    let surface = session.surface_mut();
    surface.upload_source(name, &chunks).map_err(closed_or_remote)?;

    let status = surface.compile_status(name).map_err(closed_or_remote)?;
    match status {
        Some(CompileStatus::Valid) => {
            artifact.set_status(CompileStatus::Valid);
            debug!("{} compiled", artifact);
            Ok(artifact)
        }
        Some(other) => {
            artifact.set_status(other);
            let diagnostics = surface.compile_errors(name).map_err(closed_or_remote)?;
            let report = diagnostics
                .iter()
                .map(|d| d.to_string())
                .collect::<Vec<_>>()
                .join("\n");
            error!("{} failed to compile:\n{}", artifact, report);
            Err(ControlError::Compilation(report))
        }
        None => {
            artifact.set_status(CompileStatus::Invalid);
            error!("{} is missing from the catalog after upload", name);
            Err(ControlError::Compilation(format!(
                "{} not found in catalog after upload",
                name
            )))
        }
    }
}

/// Registers the `start_socks5(port)` procedure bound to the relay's start
/// routine.
pub fn install_entry_point(
    session: &mut ControlSession,
    class_name: &str,
) -> Result<EntryPoint, ControlError> {
    let entry = EntryPoint {
        procedure: ENTRY_PROCEDURE.to_string(),
        target: format!("{}.start(int)", class_name),
    };
    session
        .surface_mut()
        .register_entry_point(&entry)
        .map_err(closed_or_remote)?;
    debug!("Registered {} -> {}", entry.procedure, entry.target);
    Ok(entry)
}

fn closed_or_remote(err: RemoteError) -> ControlError {
    match err {
        RemoteError::ConnectionClosed => ControlError::Network(err.to_string()),
        other => ControlError::Remote(other),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::control_surface::simulated::{test_profile, SimulatedHost};
    use crate::control_surface::Diagnostic;
    use crate::deployment::payload::RELAY_CLASS;

    fn open(host: &SimulatedHost) -> ControlSession {
        let _ = env_logger::builder().is_test(true).try_init();
        ControlSession::open(test_profile(), host).unwrap()
    }

    #[test]
    fn test_grants_replayed_twice_do_not_raise() {
        let host = SimulatedHost::privileged();
        let mut session = open(&host);

        grant(&mut session, 1080).unwrap();
        grant(&mut session, 1080).unwrap();

        let state = host.state();
        assert_eq!(state.grants.len(), 6);
        assert!(state.grants.iter().all(|(p, _)| p == "SYSTEM"));
        assert_eq!(state.grants[0].1.target, "db\\.internal:1080");
    }

    #[test]
    fn test_deploy_uploads_embedded_source() {
        let host = SimulatedHost::privileged();
        let mut session = open(&host);
        let source = RelaySource::embedded().unwrap();

        let artifact = deploy(&mut session, &source).unwrap();
        assert!(artifact.is_valid());
        assert_eq!(artifact.object_name(), RELAY_CLASS);
        assert_eq!(artifact.chunk_count(), source.chunks(UPLOAD_CHUNK_CHARS).len());
        assert!(artifact.chunk_count() >= 1);

        let state = host.state();
        assert_eq!(state.uploaded.len(), 1);
        assert_eq!(state.uploaded[0].0, RELAY_CLASS);
        assert_eq!(state.uploaded[0].1, source.text());
    }

    #[test]
    fn test_compilation_error_carries_every_diagnostic_in_order() {
        let host = SimulatedHost::privileged();
        {
            let mut state = host.state();
            state.compile_status = Some(CompileStatus::Invalid);
            state.diagnostics = vec![
                Diagnostic {
                    line: 12,
                    column: 9,
                    text: "cannot find symbol".to_string(),
                },
                Diagnostic {
                    line: 40,
                    column: 1,
                    text: "';' expected".to_string(),
                },
            ];
        }
        let mut session = open(&host);

        let err = deploy(&mut session, &RelaySource::new(RELAY_CLASS, "class X {")).unwrap_err();
        match err {
            ControlError::Compilation(report) => {
                assert_eq!(
                    report,
                    "Line 12-9: cannot find symbol\nLine 40-1: ';' expected"
                );
            }
            other => panic!("unexpected error: {}", other),
        }
    }

    #[test]
    fn test_missing_catalog_entry_is_compilation_error() {
        let host = SimulatedHost::privileged();
        host.state().compile_status = None;
        let mut session = open(&host);

        let err = deploy(&mut session, &RelaySource::new(RELAY_CLASS, "x")).unwrap_err();
        assert!(matches!(err, ControlError::Compilation(_)));
    }

    #[test]
    fn test_entry_point_targets_start_routine() {
        let host = SimulatedHost::privileged();
        let mut session = open(&host);

        let entry = install_entry_point(&mut session, RELAY_CLASS).unwrap();
        assert_eq!(entry.procedure, "start_socks5");
        assert_eq!(entry.target, "OracleSocks5Proxy.start(int)");
        assert_eq!(host.state().entry_points, vec![entry]);
    }

    #[test]
    fn test_closed_session_is_network_error() {
        let host = SimulatedHost::privileged();
        let mut session = open(&host);
        session.close();

        assert!(matches!(
            install_entry_point(&mut session, RELAY_CLASS),
            Err(ControlError::Network(_))
        ));
    }
}
