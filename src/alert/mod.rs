/// Alerting over joined records.
///
/// Submodules:
/// - `thresholds` — marks each joined record alert or normal against a limit.

pub mod thresholds;
