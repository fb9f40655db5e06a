//! Package installation.
//!
//! Provides:
//! - Parsing package specifications (`name@range`) and version constraints
//! - Fetching package roots and tarballs from an npm registry
//! - Resolving edges through the local, registry, tarball and GitHub strategies
//! - Expanding the dependency graph with cycle and duplicate detection
//! - A content-addressed tarball cache and package store
//! - Linking the store into `node_modules` with symlinks/junctions
//! - Running lifecycle scripts
//! - Global links, cache cleaning and saving installed specs to `package.json`

pub mod build;
pub mod error;
pub mod expand;
pub mod fetch;
pub mod flight;
pub mod global;
pub mod graph;
pub mod install;
pub mod link;
pub mod manifest;
pub mod registry;
pub mod save;
pub mod spec;
pub mod specifier;
pub mod store;
pub mod strategy;
pub mod tarball;
pub mod version;

pub use build::BuildRunner;
pub use error::{codes as pkg_codes, PkgError, ScriptFailure};
pub use expand::Expander;
pub use fetch::{FetchOutcome, Fetcher};
pub use global::{GlobalLinks, LinkReport};
pub use graph::{Dist, InstallEdge, NodeId, ResolvedPackage, Source};
pub use install::{install, install_project, install_specs, InstallSummary, InstalledPackage};
pub use link::{force_symlink, LinkKind, LinkStatus, Linker};
pub use manifest::{Manifest, PackageDeps, PkgDepError};
pub use registry::{PackageRoot, RegistryClient};
pub use save::save_specs;
pub use spec::{escape_name, PackageSpec};
pub use specifier::{GitRepo, Specifier};
pub use store::{clean_cache, ContentStore};
pub use strategy::{Resolver, Strategy};
pub use version::{max_satisfying, satisfies, Range};
