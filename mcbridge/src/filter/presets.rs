//! Ready-made filter sets for common environments.

use crate::error::FilterResult;
use crate::filter::{EventTypeFilter, FrequencyFilter, ManagedFilter, PriorityFilter, SourceFilter};

/// Drops high-volume noise and low-priority events during development.
pub fn debug_filters() -> FilterResult<Vec<ManagedFilter>> {
    Ok(vec![
        EventTypeFilter::block(["minecraft:position", "minecraft:time_change"])?.into(),
        FrequencyFilter::per_second(5.0).into(),
        PriorityFilter::at_least(10).into(),
    ])
}

/// Drops movement spam and caps per-type rates.
pub fn production_filters() -> FilterResult<Vec<ManagedFilter>> {
    Ok(vec![
        EventTypeFilter::block(["minecraft:position", "minecraft:entity_move"])?.into(),
        FrequencyFilter::per_second(20.0).into(),
        PriorityFilter::at_least(0).into(),
        SourceFilter::default().into(),
    ])
}

/// Passes only the handful of events a bot needs to stay alive and talk.
pub fn minimal_filters() -> FilterResult<Vec<ManagedFilter>> {
    Ok(vec![
        EventTypeFilter::allow([
            "minecraft:spawn",
            "minecraft:chat",
            "minecraft:health",
            "minecraft:bot_death",
        ])?
        .into(),
        PriorityFilter::at_least(30).into(),
    ])
}
