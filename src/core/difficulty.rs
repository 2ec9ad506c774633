use crate::core::block::Block;
use log::info;

/// Target seconds between blocks.
pub const BLOCK_GENERATION_INTERVAL: i64 = 10;
/// Blocks between difficulty recalculations.
pub const DIFFICULTY_ADJUSTMENT_INTERVAL: u64 = 10;

/// Difficulty for the next block given the current chain.
///
/// Recalculated when the tip index is a non-zero multiple of the
/// adjustment interval; otherwise the tip's difficulty carries forward.
/// The window is symmetric: a span under half the expected budget raises
/// difficulty by one, a span over double lowers it by one (floor 0).
pub fn next_difficulty(blocks: &[Block]) -> u32 {
    let tip = match blocks.last() {
        Some(block) => block,
        None => return 0,
    };
    if tip.get_index() % DIFFICULTY_ADJUSTMENT_INTERVAL != 0 || tip.get_index() == 0 {
        return tip.get_difficulty();
    }
    adjusted_difficulty(blocks)
}

fn adjusted_difficulty(blocks: &[Block]) -> u32 {
    let tip = blocks.last().expect("chain is never empty");
    let window = DIFFICULTY_ADJUSTMENT_INTERVAL as usize;
    if blocks.len() < window {
        return tip.get_difficulty();
    }
    let anchor = &blocks[blocks.len() - window];

    let time_expected = BLOCK_GENERATION_INTERVAL * DIFFICULTY_ADJUSTMENT_INTERVAL as i64;
    let time_taken = tip.get_timestamp() - anchor.get_timestamp();
    let current = anchor.get_difficulty();

    let next = if time_taken < time_expected / 2 {
        current + 1
    } else if time_taken > time_expected * 2 {
        current.saturating_sub(1)
    } else {
        current
    };

    if next != current {
        info!(
            "Difficulty retarget at height {}: {current} -> {next} (span {time_taken}s, expected {time_expected}s)",
            tip.get_index()
        );
    }
    next
}
