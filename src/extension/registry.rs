//! Реестр расширений: номер поля -> описание расширения.

use std::{collections::HashMap, sync::Arc};

use pbwire_error::{ensure, PbResult, StatusCode};

use super::FieldType;
use crate::{codec::MessagePrototype, wire::is_valid_field_number};

/// Проверка допустимости значения перечисления.
pub type EnumValidator = fn(i32) -> bool;

/// Описание одного расширения.
#[derive(Debug, Clone)]
pub struct ExtensionInfo {
    pub number: u32,
    pub field_type: FieldType,
    pub is_repeated: bool,
    pub is_packed: bool,
    /// Разбирать вложенное сообщение только при первом обращении
    pub is_lazy: bool,
    pub prototype: Option<MessagePrototype>,
    pub enum_validator: Option<EnumValidator>,
}

/// Расширения одного содержащего сообщения.
#[derive(Debug, Clone, Default)]
pub struct ExtensionRegistry {
    by_number: HashMap<u32, Arc<ExtensionInfo>>,
}

impl ExtensionInfo {
    pub fn singular(
        number: u32,
        field_type: FieldType,
    ) -> Self {
        Self {
            number,
            field_type,
            is_repeated: false,
            is_packed: false,
            is_lazy: false,
            prototype: None,
            enum_validator: None,
        }
    }

    pub fn repeated(
        number: u32,
        field_type: FieldType,
        is_packed: bool,
    ) -> Self {
        Self {
            is_repeated: true,
            is_packed: is_packed && field_type.is_packable(),
            ..Self::singular(number, field_type)
        }
    }

    /// Расширение-сообщение.
    pub fn message(
        number: u32,
        prototype: MessagePrototype,
    ) -> Self {
        Self {
            prototype: Some(prototype),
            ..Self::singular(number, FieldType::Message)
        }
    }

    pub fn with_lazy(
        mut self,
        lazy: bool,
    ) -> Self {
        self.is_lazy = lazy;
        self
    }

    pub fn with_prototype(
        mut self,
        prototype: MessagePrototype,
    ) -> Self {
        self.prototype = Some(prototype);
        self
    }

    pub fn with_enum_validator(
        mut self,
        validator: EnumValidator,
    ) -> Self {
        self.enum_validator = Some(validator);
        self
    }

    /// Значение перечисления допустимо. Без валидатора допустимо любое.
    pub fn is_valid_enum(
        &self,
        value: i32,
    ) -> bool {
        self.enum_validator.map_or(true, |valid| valid(value))
    }
}

impl ExtensionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Регистрирует расширение. Номер должен быть допустимым и свободным.
    pub fn register(
        &mut self,
        info: ExtensionInfo,
    ) -> PbResult<Arc<ExtensionInfo>> {
        ensure!(
            is_valid_field_number(info.number),
            StatusCode::InvalidArgs,
            "invalid extension number {}",
            info.number
        );
        ensure!(
            !self.by_number.contains_key(&info.number),
            StatusCode::InvalidArgs,
            "extension {} is already registered",
            info.number
        );
        let info = Arc::new(info);
        self.by_number.insert(info.number, info.clone());
        Ok(info)
    }

    pub fn find(
        &self,
        number: u32,
    ) -> Option<&Arc<ExtensionInfo>> {
        self.by_number.get(&number)
    }

    pub fn len(&self) -> usize {
        self.by_number.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_number.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Arc<ExtensionInfo>> {
        self.by_number.values()
    }
}
