//! Renderings of the stored summaries: the HTML page and the JSON snapshot.

pub mod html;
pub mod json;
