//! widgetlab core: compile, sandbox-evaluate and statically render React widgets.
//!
//! A widget is `widget.tsx` plus `data.json`. [`compile::compile_widget`] turns the pair
//! into a [`compile::CompiledWidget`], the [`render::RenderSupervisor`] renders it into
//! one of four [`render::ViewerView`] states, and [`store::WidgetStore`] keeps the files
//! on disk.

pub mod catalog;
pub mod compile;
pub mod digest;
pub mod markup;
pub mod obs;
pub mod policy;
pub mod render;
pub mod sequencer;
pub mod session;
pub mod store;
pub mod telemetry;

pub use catalog::{library_catalog, LibraryCatalog};
pub use compile::{
    compile_widget, instantiate, transform_widget, CompileErrorKind, CompileOptions,
    CompiledWidget, EsbuildTransform, ModuleMap, PassthroughTransform, SourceTransform,
    TransformedWidget, WidgetCompileError, WidgetSource,
};
pub use digest::SourceDigest;
pub use policy::{evaluate_import, validate_import_specifier, ImportVerdict};
pub use render::{RenderFault, RenderSupervisor, ViewerView, STAGE_SELECTOR};
pub use sequencer::RequestSequencer;
pub use session::{PlaygroundSession, ViewSnapshot};
pub use store::{StoreError, WidgetOrigin, WidgetStore};
