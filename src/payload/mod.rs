//! The VRP Store: an in-memory, versioned database of VRPs and router
//! keys, built fresh by each validation cycle and served to RTR clients.

pub use self::delta::Delta;
pub use self::snapshot::{PayloadItem, PayloadSet, Snapshot};
pub use self::store::{DeltaStatus, OwnedItem, VrpStore};
pub use self::vrp::{Afi, Prefix, RouterKey, Vrp};

mod delta;
mod snapshot;
mod store;
mod vrp;
