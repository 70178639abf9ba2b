//! Pipeline stages for building one talk.
//!
//! Each submodule implements exactly one step, so each is testable on its
//! own and the external tools can be swapped behind a trait.
//!
//! ## Data Flow
//!
//! ```text
//! PDF ──▶ extract ──▶ compress ──▶ assemble ──▶ index.html
//!       (pdftoppm)   (pngquant)   (template)
//! ```
//!
//! 1. [`extract`]  — rasterise every page and name the images so lexical
//!    order equals page order
//! 2. [`compress`] — lossy in-place PNG compression, best-effort per image
//! 3. [`assemble`] — fill the slideshow template with one slide per image
//!
//! [`template`] holds the placeholder engine shared with the landing page;
//! [`tools`] locates and runs the external executables.

pub mod assemble;
pub mod compress;
pub mod extract;
pub mod template;
pub mod tools;
