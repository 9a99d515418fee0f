//! Dedicated-server launch arguments.
//!
//! The server describes each argument with a kind; the kinds form a closed
//! set, so they are modelled as one enum and matched exhaustively.

use serde::{Deserialize, Serialize};

use crate::ProtocolError;

/// Fields shared by every argument kind.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ArgumentBase {
    pub name: String,
    /// Command-line flag, e.g. `-port`. May be empty for positional values.
    #[serde(default)]
    pub flag: String,
    #[serde(default)]
    pub mandatory: bool,
    #[serde(default)]
    pub disabled: bool,
}

/// One selectable entry of a [`Argument::Choice`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChoiceItem {
    pub name: String,
    pub value: String,
}

/// A launch argument, one variant per kind.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum Argument {
    Text {
        #[serde(flatten)]
        base: ArgumentBase,
        value: String,
        #[serde(default)]
        default: String,
    },
    Boolean {
        #[serde(flatten)]
        base: ArgumentBase,
        value: bool,
        #[serde(default)]
        default: bool,
    },
    Integer {
        #[serde(flatten)]
        base: ArgumentBase,
        value: i64,
        #[serde(default)]
        default: i64,
        min: i64,
        max: i64,
    },
    Float {
        #[serde(flatten)]
        base: ArgumentBase,
        value: f64,
        #[serde(default)]
        default: f64,
        min: f64,
        max: f64,
    },
    Choice {
        #[serde(flatten)]
        base: ArgumentBase,
        value: String,
        #[serde(default)]
        default: String,
        items: Vec<ChoiceItem>,
    },
}

impl Argument {
    pub fn base(&self) -> &ArgumentBase {
        match self {
            Argument::Text { base, .. }
            | Argument::Boolean { base, .. }
            | Argument::Integer { base, .. }
            | Argument::Float { base, .. }
            | Argument::Choice { base, .. } => base,
        }
    }

    fn base_mut(&mut self) -> &mut ArgumentBase {
        match self {
            Argument::Text { base, .. }
            | Argument::Boolean { base, .. }
            | Argument::Integer { base, .. }
            | Argument::Float { base, .. }
            | Argument::Choice { base, .. } => base,
        }
    }

    pub fn name(&self) -> &str {
        &self.base().name
    }

    pub fn is_disabled(&self) -> bool {
        self.base().disabled
    }

    pub fn enable(&mut self) {
        self.base_mut().disabled = false;
    }

    /// Disables an optional argument. Mandatory arguments stay enabled.
    pub fn disable(&mut self) {
        let base = self.base_mut();
        if !base.mandatory {
            base.disabled = true;
        }
    }

    /// Restores the default value and re-enables the argument.
    pub fn reset(&mut self) {
        match self {
            Argument::Text { value, default, .. } | Argument::Choice { value, default, .. } => {
                value.clone_from(default);
            }
            Argument::Boolean { value, default, .. } => *value = *default,
            Argument::Integer { value, default, .. } => *value = *default,
            Argument::Float { value, default, .. } => *value = *default,
        }
        self.enable();
    }

    /// Checks the current value against the argument's constraints.
    pub fn validate(&self) -> Result<(), ProtocolError> {
        let invalid = |reason: String| ProtocolError::InvalidArgument {
            name: self.name().to_string(),
            reason,
        };
        match self {
            Argument::Text { .. } | Argument::Boolean { .. } => Ok(()),
            Argument::Integer { value, min, max, .. } => {
                if value < min || value > max {
                    return Err(invalid(format!("{value} not in [{min}, {max}]")));
                }
                Ok(())
            }
            Argument::Float { value, min, max, .. } => {
                if !value.is_finite() || value < min || value > max {
                    return Err(invalid(format!("{value} not in [{min}, {max}]")));
                }
                Ok(())
            }
            Argument::Choice { value, items, .. } => {
                if items.iter().any(|item| &item.value == value) {
                    Ok(())
                } else {
                    Err(invalid(format!("{value:?} is not a listed choice")))
                }
            }
        }
    }

    /// Renders the argument as a command-line fragment.
    ///
    /// Disabled arguments and unset booleans render nothing.
    pub fn render(&self) -> Option<String> {
        let base = self.base();
        if base.disabled {
            return None;
        }
        let value = match self {
            Argument::Boolean { value, .. } => {
                return value.then(|| base.flag.clone()).filter(|f| !f.is_empty());
            }
            Argument::Text { value, .. } | Argument::Choice { value, .. } => value.clone(),
            Argument::Integer { value, .. } => value.to_string(),
            Argument::Float { value, .. } => value.to_string(),
        };
        if base.flag.is_empty() {
            Some(value)
        } else {
            Some(format!("{} {value}", base.flag))
        }
    }
}
