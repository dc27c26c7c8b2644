/// Router Module Index
///
/// Splits the API by access level. Authentication is applied per module with a
/// route layer in `create_router`, so a protected endpoint cannot end up in the
/// public router by accident.

/// Routes open to anonymous callers: the account gateway (register, verify,
/// login, refresh, password reset) and read access to the published catalog.
/// Handlers that show more to a signed-in viewer use `MaybeAuthUser`.
pub mod public;

/// Routes behind the `AuthUser` layer: profile management, authoring and the
/// community write operations.
pub mod authenticated;

/// Routes nested under `/admin`. Authenticated by the layer; the superuser check
/// happens inside each handler.
pub mod admin;
