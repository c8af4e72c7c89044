/// Analysis over fetched series.
///
/// Submodules:
/// - `reconcile` — nearest-timestamp join of a level series with a
///   quality series.
///
/// Threshold marking of joined records lives in `alert`.

pub mod reconcile;
