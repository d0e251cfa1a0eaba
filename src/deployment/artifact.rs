use crate::control_surface::CompileStatus;
use std::fmt;

/// The relay unit as deployed on the remote host.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeploymentArtifact {
    object_name: String,
    chunk_count: usize,
    status: CompileStatus,
}

impl DeploymentArtifact {
    pub(crate) fn pending(object_name: &str, chunk_count: usize) -> Self {
        Self {
            object_name: object_name.to_string(),
            chunk_count,
            status: CompileStatus::Pending,
        }
    }

    pub(crate) fn set_status(&mut self, status: CompileStatus) {
        self.status = status;
    }

    pub fn object_name(&self) -> &str {
        &self.object_name
    }

    pub fn chunk_count(&self) -> usize {
        self.chunk_count
    }

    pub fn status(&self) -> CompileStatus {
        self.status
    }

    pub fn is_valid(&self) -> bool {
        self.status == CompileStatus::Valid
    }
}

impl fmt::Display for DeploymentArtifact {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({:?})", self.object_name, self.status)
    }
}
