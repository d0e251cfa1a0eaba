//! Remote deployment pipeline: permission grants, staged source upload with a
//! compile check, and registration of the start procedure.

pub mod artifact;
pub mod grant;
pub mod payload;
pub mod pipeline;

pub use artifact::DeploymentArtifact;
pub use grant::PrivilegeGrant;
pub use payload::{RelaySource, RELAY_CLASS, UPLOAD_CHUNK_CHARS};
pub use pipeline::{deploy, grant, install_entry_point, ENTRY_PROCEDURE};
