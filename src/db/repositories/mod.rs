mod batches;
mod maintenance;
mod observations;
mod segments;
mod timeline_cards;
mod usage;
