//! Process-wide block color table.

use std::sync::{Arc, OnceLock};

use super::BlockColorTable;

static BLOCK_COLORS: OnceLock<Arc<BlockColorTable>> = OnceLock::new();

/// Installs the process-wide block color table.
///
/// Only the first call installs its table. Later calls log a warning, drop
/// their argument and return the table that is already installed.
pub fn init_block_colors(table: BlockColorTable) -> Arc<BlockColorTable> {
    let mut installed = false;
    let current = BLOCK_COLORS.get_or_init(|| {
        installed = true;
        Arc::new(table)
    });

    if installed {
        tracing::info!(blocks = current.len(), "Block color table initialized");
    } else {
        tracing::warn!("Block color table already initialized, ignoring second initialization");
    }

    Arc::clone(current)
}

/// Returns the installed block color table, if any.
pub fn block_colors() -> Option<Arc<BlockColorTable>> {
    BLOCK_COLORS.get().cloned()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::color::{BlockColorResolver, BlockMaterial};
    use image::Rgba;

    #[test]
    fn test_second_initialization_is_noop() {
        let first = BlockColorTable::builder()
            .block(1, "rock", BlockMaterial::Stone, &[Rgba([10, 10, 10, 255])])
            .build();
        let second = BlockColorTable::builder()
            .block(1, "rock", BlockMaterial::Stone, &[Rgba([200, 200, 200, 255])])
            .build();

        let installed = init_block_colors(first);
        let again = init_block_colors(second);

        assert!(Arc::ptr_eq(&installed, &again));
        assert_eq!(again.base_color(1), Rgba([10, 10, 10, 255]));
        assert!(block_colors().is_some());
    }
}
