/// riverlink_service: river level / water quality reconciliation across
/// Korean telemetry networks.
///
/// # Module structure
///
/// ```text
/// riverlink_service
/// ├── model       — shared data types (Reading, RetrievalTier, FetchError, StationFailure, …)
/// ├── config      — riverlink.toml loader: providers, tiers, offsets, limits
/// ├── stations    — station roster (stations.toml) with per-provider candidate codes
/// ├── logging     — tracing setup and failure classification
/// ├── ingest
/// │   ├── hrfco   — HRFCO water-level API: URL construction + JSON parsing
/// │   ├── nier    — NIER water-quality service on the public data portal
/// │   ├── autonet — automatic water-quality network (tag-based XML)
/// │   ├── catalog — provider station catalogs, roster generation
/// │   ├── http    — shared blocking client with per-host courtesy spacing
/// │   ├── markup  — minimal element extraction for XML payloads
/// │   └── fixtures (test only) — representative API response payloads
/// ├── resolve     — nominal code → live code, probing candidates and neighbors
/// ├── retrieval   — tiered fallback fetch, value validation, clock-skew guard
/// ├── normalize   — elevation → depth conversion for level readings
/// ├── analysis
/// │   └── reconcile  — nearest-timestamp join of level and quality series
/// ├── alert
/// │   └── thresholds — quality limit evaluation and summaries
/// ├── service     — Monitor: the request pipeline for one station
/// ├── batch       — parallel runs across stations
/// └── endpoint    — JSON HTTP API over Monitor
/// ```

/// Public modules
pub mod alert;
pub mod analysis;
pub mod batch;
pub mod config;
pub mod endpoint;
pub mod ingest;
pub mod logging;
pub mod model;
pub mod normalize;
pub mod resolve;
pub mod retrieval;
pub mod service;
pub mod stations;
