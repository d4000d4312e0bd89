//! # tomogram-datasets
//!
//! Discovery and lazy loading of cryo-ET tomograms spread over large,
//! inconsistently organized directory trees.
//!
//! Run directories are located by regex, and each is expected to hold one
//! scan (`.mrc`, `.rec` or `.npy`) next to its annotation files (IMOD `.mod`
//! or CryoET Data Portal `.ndjson`). Every scan found becomes a [`ScanHandle`]
//! that costs nothing until its voxels are asked for. Handles reachable from
//! several search roots are merged by label in a [`DatasetRegistry`].
//!
//! Directories that do not fit the expected layout are skipped, and the reason
//! goes to a caller-supplied [`DiagnosticSink`] instead of failing the batch.
//!
//! Loaded arrays are `f32` in (z, y, x) order and can optionally be contrast
//! stretched between their 2nd and 98th percentiles. Stretching and the
//! slice previews of [`Volume`] run in parallel using rayon.
//!
//! # Examples
//!
//! ## Pairing scans with annotations
//!
//! Find every run directory below `data/` whose name starts with `dg` and
//! four digits, pair its `SIRT_1k.rec` with `FM.mod`, then load the first
//! scan.
//!
//! ```no_run
//! # use tomogram_datasets::{DatasetRegistry, FileWalker, PairFinder, Pattern, TracingSink};
//! let sink = TracingSink;
//! let finder = PairFinder::new(&sink);
//! let runs = finder
//!     .walker()
//!     .find_dirs("data", &Pattern::new(r"dg\d{4}").expect("valid regex"));
//! let handles = finder.find_paired(
//!     &runs,
//!     &Pattern::new(r".*SIRT_1k\.rec$").expect("valid regex"),
//!     &[Pattern::new(r"^FM\.mod$").expect("valid regex")],
//!     &["Flagellar Motor".to_string()],
//! );
//!
//! let mut registry = DatasetRegistry::new();
//! registry.extend(handles, false);
//! let label = registry.labels().next().expect("should have found a scan");
//! let scan = registry.get_mut(&label).expect("label is registered");
//! let data = scan.load().expect("should have decoded the scan");
//! println!("{label}: {:?}", data.dim());
//! ```
//!
//! ## Sampling sub-volumes
//!
//! ```no_run
//! # use tomogram_datasets::{Annotation, ScanHandle, SubtomogramGenerator};
//! let annotation = Annotation::from_file("run/FM.mod", "Flagellar Motor")
//!     .expect("should have parsed the model");
//! let mut scan = ScanHandle::with_annotations("run/tomo.rec", vec![annotation]);
//! let mut generator = SubtomogramGenerator::new(&mut scan).expect("should have loaded");
//! let positive = generator.positive_sample(None).expect("scan has annotation points");
//! let negative = generator.negative_sample().expect("scan has empty space");
//! assert!(negative.annotations().is_empty());
//! println!("{:?}", positive.annotation_points());
//! ```

pub mod annotation;
mod contrast;
pub mod diagnostics;
pub mod enums;
pub mod error;
pub mod imod;
pub mod manifest;
pub mod mrc;
pub mod npy;
pub mod pairing;
pub mod pattern;
pub mod registry;
pub mod scan;
pub mod scan_loader;
pub mod subtomogram;
pub mod volume;
pub mod walker;

pub use annotation::{Annotation, AnnotationSource, Point};
pub use diagnostics::{CollectingSink, Diagnostic, DiagnosticSink, SilentSink, TracingSink};
pub use enums::{AnnotationFormat, MatchMode, Orientation, ScanFormat};
pub use error::{DatasetError, Result};
pub use manifest::Manifest;
pub use pairing::PairFinder;
pub use pattern::Pattern;
pub use registry::DatasetRegistry;
pub use scan::ScanHandle;
pub use scan_loader::{ScanHeader, ScanLoader};
pub use subtomogram::{Subtomogram, SubtomogramGenerator};
pub use volume::Volume;
pub use walker::{FileWalker, SetMatch};
