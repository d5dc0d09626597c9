use std::{any::Any, error::Error};

use crate::StatusCode;

/// Ошибка pbwire с кодом статуса (object-safe).
///
/// [`StackError`](crate::StackError) хранит корневую причину как
/// `Arc<dyn ErrorExt>`: по коду CLI выбирает код завершения, а `as_any`
/// позволяет достать исходную [`WireError`](crate::WireError).
pub trait ErrorExt: Error + Send + Sync + 'static {
    /// Код статуса, по умолчанию [`StatusCode::Internal`].
    fn status_code(&self) -> StatusCode {
        StatusCode::Internal
    }

    fn as_any(&self) -> &dyn Any;
}
