//! Simulator-side BFM glue contract.

use crate::error::Result;

/// Metadata for one BFM instance discovered in the design.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BfmInstanceDesc {
    /// Declared type name.
    pub type_name: String,
    /// Hierarchical instance name.
    pub instance_name: String,
    /// `"<package>.<Class>"` of the host driver.
    pub class_path: String,
}

impl BfmInstanceDesc {
    /// Bundles instance metadata.
    #[must_use]
    pub fn new(
        type_name: impl Into<String>,
        instance_name: impl Into<String>,
        class_path: impl Into<String>,
    ) -> Self {
        Self {
            type_name: type_name.into(),
            instance_name: instance_name.into(),
            class_path: class_path.into(),
        }
    }
}

/// What the generated simulator glue provides to the registry.
pub trait BfmBackend {
    /// Number of BFM instances in the design.
    fn instance_count(&self) -> usize;

    /// Metadata for instance `index` in `0..instance_count()`.
    fn instance_info(&self, index: usize) -> Result<BfmInstanceDesc>;

    /// Queues an import call for the simulator side of `bfm_id`.
    fn send_msg(&self, bfm_id: usize, method_id: usize, params: &[u64]) -> Result<()>;
}
