use std::fmt::Display;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Upper bound for every descriptive field, in characters.
pub const MAX_FIELD_LEN: usize = 30;

/// Identifier assigned by the store when a score is created.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ScoreId(pub i64);

impl Display for ScoreId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A catalog entry describing a musical score
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Score {
    pub id: ScoreId,
    pub number: Option<String>,
    pub title: String,
    pub composer: Option<String>,
    pub arranger: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("field `{field}` is longer than {max} characters")]
pub struct ValidationError {
    pub field: &'static str,
    pub max: usize,
}

/// Descriptive fields of a score, checked against [`MAX_FIELD_LEN`].
///
/// Used for both create and update: an update always replaces all four fields.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScoreInput {
    number: Option<String>,
    title: String,
    composer: Option<String>,
    arranger: Option<String>,
}

impl ScoreInput {
    pub fn new(
        number: Option<String>,
        title: Option<String>,
        composer: Option<String>,
        arranger: Option<String>,
    ) -> Result<Self, ValidationError> {
        check_len("number", number.as_deref())?;
        check_len("title", title.as_deref())?;
        check_len("composer", composer.as_deref())?;
        check_len("arranger", arranger.as_deref())?;

        Ok(Self {
            number,
            title: title.unwrap_or_default(),
            composer,
            arranger,
        })
    }

    pub fn number(&self) -> Option<&str> {
        self.number.as_deref()
    }

    pub fn title(&self) -> &str {
        &self.title
    }

    pub fn composer(&self) -> Option<&str> {
        self.composer.as_deref()
    }

    pub fn arranger(&self) -> Option<&str> {
        self.arranger.as_deref()
    }
}

fn check_len(field: &'static str, value: Option<&str>) -> Result<(), ValidationError> {
    match value {
        Some(v) if v.chars().count() > MAX_FIELD_LEN => Err(ValidationError {
            field,
            max: MAX_FIELD_LEN,
        }),
        _ => Ok(()),
    }
}
