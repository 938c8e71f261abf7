pub mod me;
pub mod snapshots;

// Re-export handler functions for use in routing
pub use me::get as me_get;

pub use snapshots::delete as snapshots_delete;
pub use snapshots::get as snapshots_get;
pub use snapshots::post as snapshots_post;
