//! Utility functions and helper methods for the realm server.
//!
//! This module provides convenient factory functions for creating server
//! instances with different configurations.

use std::sync::Arc;

use crate::config::ServerConfig;
use crate::directory::{Directory, MemoryIdentity, MemoryStore};
use crate::server::RealmServer;

/// Creates a new realm server with default configuration and in-memory
/// collaborators.
///
/// Convenient for development and tests; a production embedding supplies
/// its own [`Directory`] via [`create_server_with_config`].
pub fn create_server() -> RealmServer {
    create_server_with_config(ServerConfig::default(), memory_directory())
}

/// Creates a new realm server with custom configuration and collaborators.
pub fn create_server_with_config(config: ServerConfig, directory: Directory) -> RealmServer {
    RealmServer::new(config, directory)
}

/// An in-memory [`Directory`] backed by [`MemoryIdentity`] and
/// [`MemoryStore`].
pub fn memory_directory() -> Directory {
    Directory {
        identity: Arc::new(MemoryIdentity::new()),
        store: Arc::new(MemoryStore::new()),
    }
}
