//! Interfaces of the external collaborators driven by the orchestrator.
//!
//! Implementations wrap a provider SDK for one account; the orchestrator only
//! sees these traits, so workflows can run against in-memory doubles.

use std::future::Future;
use std::pin::Pin;

use crate::error::ProviderError;

mod control_plane;
mod identity;

pub use control_plane::{
    AccessPoint, AccessPointSpec, ControlPlane, FileSystem, FileSystemSpec, LifecycleState,
    MountEndpoint, MountEndpointSpec, PERFORMANCE_MODE_GENERAL_PURPOSE, PosixIdentity,
    RESOURCE_TYPE_FILE_SYSTEM, RootDirectory, RootDirectoryCreation, SizeSnapshot,
    SubnetDirectory, TagFilter, TaggedResource,
};
pub use identity::{AccessKey, AccessKeyMetadata, IdentityProvider, IdentityUser, ManagedPolicy};

/// Future returned by collaborator operations.
pub type ProviderFuture<'a, T> = Pin<Box<dyn Future<Output = Result<T, ProviderError>> + Send + 'a>>;
