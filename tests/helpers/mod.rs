#![allow(dead_code)]
pub mod mock_destination;
pub mod test_utils;

use mock_destination::RecordingDestination;
use runwatch::core::Destination;
use std::sync::Arc;

/// Erases the concrete type for APIs that take trait objects.
pub fn as_destinations(destinations: &[Arc<RecordingDestination>]) -> Vec<Arc<dyn Destination>> {
    destinations
        .iter()
        .map(|d| d.clone() as Arc<dyn Destination>)
        .collect()
}
