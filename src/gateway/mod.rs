// ============================================================================
// Gateway Dispatch
// ============================================================================
//
// Request routing and proxying:
// - Static route table mapping the public API surface to backends
// - Scope authorization and instance resolution
// - Schema transformation between the public camelCase contract and the
//   automation backend's PascalCase wire format
// - Pass-through proxying for bypass and internal-secret routes
//
// ============================================================================

pub mod router;
pub mod service_client;

pub use router::{dispatch, dispatch_bypass, get_route, requires_auth, AuthMode, Backend};
pub use service_client::ServiceClient;
