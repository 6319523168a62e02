//! Per-session ingest: decoded bytes in, graph mutations out
//!
//! One `SceneSession` per simulator connection. Message framing and
//! reliability live in the transport layer; whole message payloads arrive
//! here by name. A malformed message is reported (identifying the message)
//! and dropped; it never aborts the session or corrupts committed state.

use prism_core::PrismResult;
use tracing::warn;

use crate::manager::ObjectManager;
use crate::update::{
    UpdateCodec, CACHED_UPDATE, COMPRESSED_UPDATE, KILL_OBJECT, OBJECT_UPDATE, TERSE_UPDATE,
};

/// Codec plus entity table for one connection
pub struct SceneSession {
    codec: UpdateCodec,
    manager: ObjectManager,
}

impl SceneSession {
    pub fn new() -> Self {
        SceneSession {
            codec: UpdateCodec::new(),
            manager: ObjectManager::new(),
        }
    }

    pub fn manager(&self) -> &ObjectManager {
        &self.manager
    }

    pub fn manager_mut(&mut self) -> &mut ObjectManager {
        &mut self.manager
    }

    pub fn codec(&self) -> &UpdateCodec {
        &self.codec
    }

    /// Ingest one whole message payload by message name
    ///
    /// Unhandled message names are ignored (the proxy forwards plenty of
    /// traffic the scene engine has no interest in).
    pub fn handle_message(&mut self, name: &str, bytes: &[u8]) {
        let result = self.dispatch(name, bytes);
        if let Err(err) = result {
            warn!(message = name, %err, "malformed message dropped");
        }
    }

    fn dispatch(&mut self, name: &str, bytes: &[u8]) -> PrismResult<()> {
        match name {
            OBJECT_UPDATE => {
                for update in self.codec.decode_full(bytes)? {
                    self.manager.apply_update(&update);
                }
            }
            TERSE_UPDATE => {
                for update in self.codec.decode_terse(bytes)? {
                    self.manager.apply_update(&update);
                }
            }
            CACHED_UPDATE => {
                for update in self.codec.decode_cached(bytes)? {
                    self.manager.apply_update(&update);
                }
            }
            COMPRESSED_UPDATE => {
                for update in self.codec.decode_compressed(bytes)? {
                    self.manager.apply_update(&update);
                }
            }
            KILL_OBJECT => {
                for local_id in self.codec.decode_kill(bytes)? {
                    self.manager.kill(local_id);
                }
            }
            _ => {}
        }
        Ok(())
    }
}

impl Default for SceneSession {
    fn default() -> Self {
        SceneSession::new()
    }
}
