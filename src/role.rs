/// Which end of the connection a decoder reads for.
///
/// Clients must mask every frame they send and servers must never mask,
/// so the role decides which mask bit a decoder accepts.
pub trait RolePolicy: Send + Sync + 'static {
    /// Decoding frames sent by a client, so the mask bit is required.
    const SERVER: bool;
}

/// Reads frames from a client: every frame must be masked.
#[derive(Copy, Clone, Debug)]
pub struct Server;

/// Reads frames from a server: no frame may be masked.
#[derive(Copy, Clone, Debug)]
pub struct Client;

impl RolePolicy for Server {
    const SERVER: bool = true;
}

impl RolePolicy for Client {
    const SERVER: bool = false;
}
