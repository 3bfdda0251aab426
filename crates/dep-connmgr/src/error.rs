use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConnMgrError {
    #[error("connection {0} closed before the trim loop could close it")]
    AlreadyClosed(u64),
}

pub type ConnMgrResult<T> = Result<T, ConnMgrError>;
