#![forbid(unsafe_code)]

//! Three-stage demo of async row loading in a scrollable terminal list.
//!
//! 300 rows, a data source that takes about a second per lookup, and a
//! viewport's worth of reused row slots. The three stages show the classic
//! progression:
//!
//! 1. **Blocking** — look the row up on the UI thread. Correct text,
//!    frozen UI: scrolling stutters a full fetch per newly visible row.
//! 2. **Racy** — move the lookup to a background pool and write back on
//!    the UI thread with no cancellation. Smooth scrolling, wrong text:
//!    recycled rows flicker through stale results as superseded fetches
//!    land late.
//! 3. **Coordinated** — the `rowfetch-core` coordinator: per-slot serial
//!    queues plus commit-time cancellation checks. Smooth and correct.
//!
//! Keys: `1`/`2`/`3` select the stage, arrows and PageUp/PageDown/Home/End
//! scroll, `q` quits.

pub mod app;
pub mod model;
pub mod recycler;
