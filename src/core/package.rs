//! Packaging stage: build directory to a single archive.

use std::path::Path;
use std::sync::Arc;

use tracing::{info, instrument};

use crate::adapters::{Archiver, PackagingError};
use crate::domain::{Artifact, RunIdentity};

/// Packages a source directory into `<work_dir>/<run_id>.zip`
pub struct Packager {
    archiver: Arc<dyn Archiver>,
}

impl Packager {
    pub fn new(archiver: Arc<dyn Archiver>) -> Self {
        Self { archiver }
    }

    #[instrument(skip(self, identity), fields(archiver = self.archiver.name()))]
    pub async fn package(
        &self,
        identity: &RunIdentity,
        source: &Path,
        work_dir: &Path,
    ) -> Result<Artifact, PackagingError> {
        let destination = work_dir.join(identity.artifact_file_name());
        let size = self.archiver.archive(source, &destination).await?;

        info!(
            path = %destination.display(),
            size_bytes = size,
            "Build packaged"
        );
        Ok(Artifact::new(destination, size))
    }
}
