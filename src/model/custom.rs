//! Custom metadata entries and the reserved keys the pipeline owns.

use crate::tree::{NodeId, XmlTree};

/// Program name written into synthesized metadata.
pub const PROGRAM_NAME: &str = "fb2mend";

/// Reserved `info-type` carrying the processing status.
pub const STATUS_INFO_TYPE: &str = "fb2mend-status";

/// Reserved `info-type` archiving a legacy LibRusEc id.
pub const LIBRUSEC_INFO_TYPE: &str = "librusec-id";

/// Reserved `info-type` archiving a replaced document id.
pub const PREVIOUS_ID_INFO_TYPE: &str = "previous-id";

/// The `info-type` keys owned by the pipeline and hidden from pass-through.
pub const RESERVED_INFO_TYPES: [&str; 3] =
    [STATUS_INFO_TYPE, LIBRUSEC_INFO_TYPE, PREVIOUS_ID_INFO_TYPE];

/// A non-reserved `custom-info` entry. The backing element stays in the tree
/// untouched across repair; this view exists for callers that want to inspect
/// entries without walking the tree.
#[derive(Debug, Clone)]
pub struct CustomInfo {
    pub node: NodeId,
    pub info_type: Option<String>,
    pub text: String,
}

impl CustomInfo {
    pub(crate) fn load(tree: &XmlTree, element: NodeId) -> Self {
        Self {
            node: element,
            info_type: tree
                .attr(element, "info-type")
                .filter(|value| !value.is_empty())
                .map(str::to_string),
            text: tree.inner_text(element).trim().to_string(),
        }
    }
}
