//! The rendering engine: transforms, layer buffers, chunked drawing, labels,
//! extent history and the frames that tie them together.

pub mod buffer;
pub mod chunked;
pub mod dateline;
pub mod events;
pub mod feature;
pub mod frame;
pub mod geometry;
pub mod history;
pub mod labels;
pub mod layer;
pub mod spatial;
pub mod symbology;
mod transform;

pub use chunked::{Flow, NullHost, RenderHost};
pub use dateline::{DatelineCompositor, DatelineSplit};
pub use events::MapEvent;
pub use feature::{AttributeValue, Feature, FeatureId};
pub use frame::{MapFrame, RenderOutcome};
pub use geometry::Geometry;
pub use layer::{FeatureLayer, ImageLayer, ImageTile, Layer, LayerId, LayerStack, SharedLayers};
pub use transform::{PixelRect, ScreenRect, Transform};
