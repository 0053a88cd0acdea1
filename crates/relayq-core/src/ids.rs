use crate::{JobId, LeaseId};
use uuid::Uuid;

pub fn new_job_id() -> JobId {
    Uuid::new_v4()
}

/// Random v4 UUIDs carry 122 bits of entropy; a lease id must not be
/// predictable from anything a client can observe.
pub fn new_lease_id() -> LeaseId {
    Uuid::new_v4()
}
