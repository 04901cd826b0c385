// Ticket Reveal - ad-gated lottery ticket scan results

pub mod core;
pub mod page;
