//! Workspace port rendezvous
//!
//! The server and the editor extension each derive the same TCP port from
//! the workspace path, so a client can find its own server without any
//! discovery handshake and concurrent workspaces never collide.

/// First port of the rendezvous range
pub const BASE_PORT: u16 = 8123;

/// Number of ports in the range; ports land in [8123, 8200)
pub const PORT_SPAN: u32 = 77;

/// Map a workspace path to its rendezvous port
///
/// This is a shared contract with the editor extension: both sides must use
/// byte-identical arithmetic. The canonical definition is a Java-style hash:
/// fold `a = a*31 + scalar(c)` over the path's chars in wrapping 32-bit
/// signed arithmetic, take the mathematical absolute value, reduce mod 77,
/// add to the base port. Changing any step here breaks every deployed
/// extension.
pub fn workspace_port(workspace_path: &str) -> u16 {
    let mut acc: i32 = 0;
    for c in workspace_path.chars() {
        acc = acc.wrapping_mul(31).wrapping_add(c as i32);
    }
    BASE_PORT + (acc.unsigned_abs() % PORT_SPAN) as u16
}
