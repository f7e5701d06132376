use serde::Deserialize;

use crate::utils::{numeric_param, required_param};
use libris_http::AppError;

/// Query string of `GET /books/title`.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct TitleQuery {
    pub title: Option<String>,
}

impl TitleQuery {
    pub fn title(&self) -> Result<&str, AppError> {
        required_param("title", self.title.as_deref())
    }
}

/// Query string of `GET /books/year`.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct YearRangeQuery {
    pub from: Option<String>,
    pub to: Option<String>,
}

impl YearRangeQuery {
    /// Both bounds, parsed. The range is not reordered: `from > to` matches nothing.
    pub fn bounds(&self) -> Result<(f64, f64), AppError> {
        Ok((
            numeric_param("from", self.from.as_deref())?,
            numeric_param("to", self.to.as_deref())?,
        ))
    }
}

/// Query string of `GET /books/genre`.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct GenreQuery {
    pub genre: Option<String>,
}

impl GenreQuery {
    pub fn genre(&self) -> Result<&str, AppError> {
        required_param("genre", self.genre.as_deref())
    }
}

/// Query string of `DELETE /books/before-year`.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct BeforeYearQuery {
    pub year: Option<String>,
}

impl BeforeYearQuery {
    pub fn threshold(&self) -> Result<f64, AppError> {
        numeric_param("year", self.year.as_deref())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn year_range_requires_both_bounds() {
        let query = YearRangeQuery {
            from: Some("2000".to_string()),
            to: None,
        };
        assert!(query.bounds().is_err());

        let query = YearRangeQuery {
            from: Some("2000".to_string()),
            to: Some("2010".to_string()),
        };
        assert_eq!(query.bounds().unwrap(), (2000.0, 2010.0));
    }

    #[test]
    fn non_numeric_year_is_rejected() {
        let query = BeforeYearQuery {
            year: Some("last-year".to_string()),
        };
        assert_eq!(
            query.threshold().unwrap_err().status(),
            axum::http::StatusCode::BAD_REQUEST
        );
    }
}
