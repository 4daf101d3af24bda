/// Outcome of an internal lifecycle-engine operation.
///
/// Mirrors the two-valued `WEBCFG_STATUS` result used throughout the component this crate is
/// modeled on: most table operations (`stop`, `update`, `delete`, `retry`, ...) either fully
/// succeed or fully fail, with no partial result worth modeling separately.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Status {
    Success,
    Failure,
}

impl Status {
    pub fn is_success(self) -> bool {
        matches!(self, Status::Success)
    }

    pub fn from_bool(ok: bool) -> Self {
        if ok {
            Status::Success
        } else {
            Status::Failure
        }
    }
}
