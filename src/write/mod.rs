//! Image authoring: source tree, layout planning, serialization

pub mod layout;
pub mod serializer;
pub mod tree;

use std::io::Write;

use tracing::info;

use crate::error::Result;
pub use layout::ImageOptions;
pub use tree::{SourceId, SourceNode, SourceTree};

/// Plan and write an ISO9660 image to `out`; returns bytes written
///
/// The layout is fully computed before the first byte is emitted, so a
/// planning failure leaves the output untouched and the write itself
/// proceeds strictly sequentially.
pub fn write_image<W: Write>(tree: &SourceTree, options: &ImageOptions, out: W) -> Result<u64> {
    let plan = layout::plan(tree, options)?;
    let written = serializer::serialize(tree, options, &plan, out)?;
    info!(
        bytes = written,
        sectors = plan.total_sectors,
        joliet = options.joliet,
        rock_ridge = options.rock_ridge,
        "image written"
    );
    Ok(written)
}
