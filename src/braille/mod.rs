mod canvas;

pub use canvas::{BrailleCanvas, BrailleCell};
