use serde::Serialize;

pub const DEFAULT_PAGE: i64 = 1;
pub const DEFAULT_LIMIT: i64 = 20;

/// Page window parsed from `page` / `limit` query values.
///
/// `paginate` is only set when the caller sent either parameter; list
/// endpoints return every row otherwise.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Pagination {
    pub paginate: bool,
    pub page: i64,
    pub limit: i64,
    pub offset: i64,
}

impl Pagination {
    pub fn from_params(page: Option<&str>, limit: Option<&str>) -> Self {
        let paginate = page.is_some() || limit.is_some();
        let page = page.and_then(parse_positive_int).unwrap_or(DEFAULT_PAGE);
        let limit = limit.and_then(parse_positive_int).unwrap_or(DEFAULT_LIMIT);

        Self {
            paginate,
            page,
            limit,
            offset: (page - 1).saturating_mul(limit),
        }
    }

    pub fn meta(&self, total: i64) -> PageMeta {
        PageMeta {
            page: self.page,
            limit: self.limit,
            total,
            total_pages: if total > 0 {
                (total + self.limit - 1) / self.limit
            } else {
                0
            },
        }
    }

    /// Wraps rows in the envelope matching how the request was made.
    pub fn listing<T>(&self, data: Vec<T>, total: i64) -> Listing<T> {
        if self.paginate {
            Listing::Page(Paginated {
                data,
                pagination: self.meta(total),
            })
        } else {
            Listing::All(data)
        }
    }
}

/// Positive finite number, floored. Anything else is rejected.
fn parse_positive_int(raw: &str) -> Option<i64> {
    let parsed: f64 = raw.trim().parse().ok()?;
    if !parsed.is_finite() || parsed <= 0.0 {
        return None;
    }
    let floored = parsed.floor();
    if floored < 1.0 || floored > i32::MAX as f64 {
        return None;
    }
    Some(floored as i64)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PageMeta {
    pub page: i64,
    pub limit: i64,
    pub total: i64,
    pub total_pages: i64,
}

#[derive(Debug, Serialize)]
pub struct Paginated<T> {
    pub data: Vec<T>,
    pub pagination: PageMeta,
}

/// Bare array when unpaginated, `{ data, pagination }` otherwise.
#[derive(Debug, Serialize)]
#[serde(untagged)]
pub enum Listing<T> {
    All(Vec<T>),
    Page(Paginated<T>),
}
