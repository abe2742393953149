pub mod alert;
pub mod detection;
pub mod geometry;
pub mod heatmap;
pub mod history;
pub mod visitor_ledger;
pub mod zone;
