/// Немедленно возвращает ошибку (аналогично `anyhow::bail!`).
///
/// Поддерживает три формы:
/// - `bail!(err)` — готовый тип ошибки или `StackError`-совместимый тип;
/// - `bail!(code, "msg")` — `GenericError` с кодом и сообщением;
/// - `bail!(code, "fmt {}", arg)` — форматированное сообщение.
///
/// ```ignore
/// use pbwire_error::{bail, StatusCode};
///
/// fn check_chunk(size: usize) -> pbwire_error::PbResult<()> {
///     if size == 0 {
///         bail!(StatusCode::InvalidArgs, "chunk size must be positive");
///     }
///     Ok(())
/// }
/// ```
#[macro_export]
macro_rules! bail {
    ($err:expr) => {
        return Err($crate::StackError::from($err))
    };
    ($code:expr, $msg:expr) => {
        return Err($crate::StackError::new(
            $crate::types::GenericError::new($code, $msg)
        ))
    };
    ($code:expr, $fmt:expr, $($arg:tt)*) => {
        return Err($crate::StackError::new(
            $crate::types::GenericError::new($code, format!($fmt, $($arg)*))
        ))
    };
}

/// Проверяет условие и вызывает `bail!`, если условие ложно.
///
/// Формы аналогичны `bail!`.
#[macro_export]
macro_rules! ensure {
    ($cond:expr, $err:expr) => {
        if !($cond) {
            $crate::bail!($err);
        }
    };
    ($cond:expr, $code:expr, $msg:expr) => {
        if !($cond) {
            $crate::bail!($code, $msg);
        }
    };
    ($cond:expr, $code:expr, $fmt:expr, $($arg:tt)*) => {
        if !($cond) {
            $crate::bail!($code, $fmt, $($arg)*);
        }
    };
}

/// Добавляет контекст к `Result`, превращая ошибку в `StackError`.
#[macro_export]
macro_rules! context {
    ($result:expr, $msg:expr) => {
        match $result {
            Ok(val) => Ok(val),
            Err(e) => Err($crate::StackError::from(e).context($msg)),
        }
    };
    ($result:expr, $fmt:expr, $($arg:tt)*) => {
        match $result {
            Ok(val) => Ok(val),
            Err(e) => Err($crate::StackError::from(e).context(format!($fmt, $($arg)*))),
        }
    };
}

/// Трейт-расширение для `Result`, добавляющее методы контекстирования.
pub trait ResultExt<T> {
    /// Если `self` — `Err`, оборачивает ошибку в `StackError` и добавляет
    /// контекст.
    fn context<C>(
        self,
        ctx: C,
    ) -> Result<T, crate::StackError>
    where
        C: Into<String>;

    /// Ленивый контекст (строка строится только в случае ошибки).
    fn with_context<C, F>(
        self,
        f: F,
    ) -> Result<T, crate::StackError>
    where
        C: Into<String>,
        F: FnOnce() -> C;
}

impl<T, E> ResultExt<T> for Result<T, E>
where
    E: Into<crate::StackError>,
{
    #[track_caller]
    fn context<C>(
        self,
        ctx: C,
    ) -> Result<T, crate::StackError>
    where
        C: Into<String>,
    {
        self.map_err(|e| e.into().context(ctx))
    }

    #[track_caller]
    fn with_context<C, F>(
        self,
        f: F,
    ) -> Result<T, crate::StackError>
    where
        C: Into<String>,
        F: FnOnce() -> C,
    {
        self.map_err(|e| e.into().context(f()))
    }
}

////////////////////////////////////////////////////////////////////////////////
// Тесты
////////////////////////////////////////////////////////////////////////////////

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{PbResult, StatusCode, WireError};

    #[test]
    fn test_bail_simple() {
        fn example() -> PbResult<()> {
            bail!(WireError::MalformedVarint);
        }

        let err = example().unwrap_err();
        assert_eq!(err.status_code(), StatusCode::MalformedVarint);
    }

    #[test]
    fn test_bail_with_format() {
        fn example(size: usize) -> PbResult<()> {
            bail!(StatusCode::InvalidArgs, "bad chunk size: {}", size);
        }

        let err = example(0).unwrap_err();
        assert!(err.to_string().contains("bad chunk size: 0"));
    }

    #[test]
    fn test_ensure() {
        fn validate(depth: u32) -> PbResult<()> {
            ensure!(depth > 0, StatusCode::InvalidArgs, "depth must be positive");
            ensure!(
                depth <= 10_000,
                StatusCode::InvalidArgs,
                "depth too large: {}",
                depth
            );
            Ok(())
        }

        assert!(validate(100).is_ok());
        assert!(validate(0).is_err());
        assert!(validate(20_000).is_err());
    }

    #[test]
    fn test_result_ext() {
        fn inner() -> Result<(), WireError> {
            Err(WireError::Truncated { context: "fixed32" })
        }

        fn outer() -> PbResult<()> {
            inner().context("decoding header")?;
            Ok(())
        }

        let err = outer().unwrap_err();
        assert_eq!(err.contexts().len(), 1);
        assert_eq!(err.contexts()[0].message, "decoding header");
        assert!(err.downcast_ref::<WireError>().is_some());
    }

    #[test]
    fn test_with_context_lazy() {
        fn example(success: bool) -> PbResult<()> {
            let result: Result<(), WireError> = if success {
                Ok(())
            } else {
                Err(WireError::LimitExceeded)
            };
            result.with_context(|| format!("field {}", 7))?;
            Ok(())
        }

        assert!(example(true).is_ok());
        let err = example(false).unwrap_err();
        assert!(err.to_string().starts_with("field 7"));
    }
}
