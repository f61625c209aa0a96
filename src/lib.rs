//! sitestack
//!
//! Declares the managed resources of a static site plus API deployment,
//! resolves the references between them, derives least-privilege
//! permissions from explicit grants, binds HTTP routes to functions and
//! synthesizes a deterministic deployment template.
//!
//! ```
//! use sitestack::resource::{options, AttributeRef, Options, ResourceKind};
//! use sitestack::{synthesize, Descriptor, Environment};
//!
//! let mut stack = Descriptor::new("site", Environment::new("123456789012", "us-east-1")).unwrap();
//! stack.declare("assets", ResourceKind::Storage, Options::new()).unwrap();
//! stack
//!     .declare(
//!         "cdn",
//!         ResourceKind::Cdn,
//!         options([("origin", AttributeRef::new("assets", "regionalDomainName").into())]),
//!     )
//!     .unwrap();
//!
//! let artifact = synthesize(&stack).unwrap();
//! assert_eq!(artifact.resources[0].declaration.id, "assets");
//! ```

pub mod assemble;
pub mod check;
pub mod config;
pub mod descriptor;
pub mod error;
pub mod grant;
pub mod resolve;
pub mod resource;
pub mod route;
pub mod synth;

pub use descriptor::{Descriptor, Environment, NamedOutput};
pub use error::{DeployError, Result};
pub use synth::{synthesize, Artifact};
