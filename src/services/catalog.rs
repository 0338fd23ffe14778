//! Public catalog: active listings with owner and weekly windows.

use sqlx::SqlitePool;

use crate::config::CatalogConfig;
use crate::db::{
    CatalogFilters, CatalogListing, CatalogParams, CatalogRow, CatalogWindow, FilterOptions,
    OwnerSummary, Pagination, PriceRange,
};
use crate::storage::ImageStore;

use super::availability::windows_by_listing;
use super::error::{FieldErrors, ServiceError, ServiceResult};

/// Price range reported when no listing is active
const DEFAULT_PRICE_RANGE: PriceRange = PriceRange {
    min: 0.0,
    max: 1000.0,
};

/// Validated catalog query
#[derive(Debug, Clone)]
pub struct CatalogQuery {
    pub filters: CatalogFilters,
    pub page: u32,
    pub per_page: u32,
}

impl CatalogQuery {
    /// Validate raw query-string parameters
    pub fn from_params(params: CatalogParams, config: &CatalogConfig) -> ServiceResult<Self> {
        let mut errors = FieldErrors::new();

        let mut price = |field: &str, value: Option<String>| -> Option<f64> {
            let value = value?;
            match value.parse::<f64>() {
                Ok(p) if p.is_finite() && p >= 0.0 => Some(p),
                _ => {
                    errors
                        .entry(field.to_string())
                        .or_default()
                        .push(format!("The {} must be a non-negative number.", field));
                    None
                }
            }
        };
        let min_price = price("min_price", params.min_price);
        let max_price = price("max_price", params.max_price);

        let mut positive = |field: &str, value: Option<String>, default: u32| -> u32 {
            match value {
                None => default,
                Some(v) => match v.parse::<u32>() {
                    Ok(n) if n > 0 => n,
                    _ => {
                        errors
                            .entry(field.to_string())
                            .or_default()
                            .push(format!("The {} must be a positive integer.", field));
                        default
                    }
                },
            }
        };
        let page = positive("page", params.page, 1);
        let per_page = positive("per_page", params.per_page, config.per_page);

        if !errors.is_empty() {
            return Err(ServiceError::Validation(errors));
        }

        Ok(Self {
            filters: CatalogFilters {
                city: params.city,
                car_model: params.car_model,
                color: params.color,
                min_price,
                max_price,
            },
            page,
            per_page: per_page.min(config.max_per_page.max(1)),
        })
    }
}

enum Bind {
    Text(String),
    Real(f64),
}

/// `%value%` with LIKE wildcards in `value` matched literally
fn contains_pattern(value: &str) -> String {
    let mut pattern = String::with_capacity(value.len() + 2);
    pattern.push('%');
    for c in value.chars() {
        if matches!(c, '%' | '_' | '\\') {
            pattern.push('\\');
        }
        pattern.push(c);
    }
    pattern.push('%');
    pattern
}

fn where_clause(filters: &CatalogFilters) -> (String, Vec<Bind>) {
    let mut conditions = vec!["l.active = 1".to_string()];
    let mut bindings = Vec::new();

    if let Some(city) = &filters.city {
        conditions.push("l.city LIKE ? ESCAPE '\\'".to_string());
        bindings.push(Bind::Text(contains_pattern(city)));
    }
    if let Some(car_model) = &filters.car_model {
        conditions.push("l.car_model LIKE ? ESCAPE '\\'".to_string());
        bindings.push(Bind::Text(contains_pattern(car_model)));
    }
    if let Some(color) = &filters.color {
        conditions.push("l.color = ?".to_string());
        bindings.push(Bind::Text(color.clone()));
    }
    if let Some(min) = filters.min_price {
        conditions.push("l.price >= ?".to_string());
        bindings.push(Bind::Real(min));
    }
    if let Some(max) = filters.max_price {
        conditions.push("l.price <= ?".to_string());
        bindings.push(Bind::Real(max));
    }

    (format!("WHERE {}", conditions.join(" AND ")), bindings)
}

/// Active listings, premium first then newest, one page at a time
pub async fn list_active_listings(
    db: &SqlitePool,
    store: &dyn ImageStore,
    query: &CatalogQuery,
) -> ServiceResult<(Vec<CatalogListing>, Pagination)> {
    let (where_sql, bindings) = where_clause(&query.filters);

    let count_sql = format!("SELECT COUNT(*) FROM listings l {}", where_sql);
    let mut count_query = sqlx::query_scalar::<_, i64>(&count_sql);
    for binding in &bindings {
        count_query = match binding {
            Bind::Text(v) => count_query.bind(v),
            Bind::Real(v) => count_query.bind(*v),
        };
    }
    let total = count_query.fetch_one(db).await?;

    let pagination = Pagination::new(query.page, query.per_page, total);

    let select_sql = format!(
        r#"
        SELECT l.*, u.name AS owner_name, u.email AS owner_email
        FROM listings l
        LEFT JOIN users u ON u.id = l.user_id
        {}
        ORDER BY l.premium DESC, l.created_at DESC, l.rowid DESC
        LIMIT ? OFFSET ?
        "#,
        where_sql
    );
    let mut select = sqlx::query_as::<_, CatalogRow>(&select_sql);
    for binding in &bindings {
        select = match binding {
            Bind::Text(v) => select.bind(v),
            Bind::Real(v) => select.bind(*v),
        };
    }
    let rows = select
        .bind(pagination.per_page as i64)
        .bind(pagination.offset())
        .fetch_all(db)
        .await?;

    let ids: Vec<String> = rows.iter().map(|r| r.listing.id.clone()).collect();
    let mut windows = windows_by_listing(db, &ids).await?;

    let data = rows
        .into_iter()
        .map(|row| {
            let listing = row.listing;
            let images = listing
                .image_paths()
                .iter()
                .map(|path| store.url_for(path))
                .collect();
            let availability = windows
                .remove(&listing.id)
                .unwrap_or_default()
                .into_iter()
                .map(CatalogWindow::from)
                .collect();

            CatalogListing {
                id: listing.id,
                title: listing.title,
                description: listing.description,
                car_model: listing.car_model,
                city: listing.city,
                color: listing.color,
                price: listing.price,
                premium: listing.premium,
                images,
                owner: OwnerSummary {
                    name: row.owner_name.unwrap_or_else(|| "Unknown".to_string()),
                    email: row.owner_email.unwrap_or_default(),
                },
                availability,
                created_at: listing.created_at,
            }
        })
        .collect();

    Ok((data, pagination))
}

async fn distinct_values(db: &SqlitePool, column: &str) -> ServiceResult<Vec<String>> {
    let sql = format!(
        "SELECT DISTINCT {col} FROM listings WHERE active = 1 AND {col} IS NOT NULL AND {col} <> '' ORDER BY {col}",
        col = column
    );
    Ok(sqlx::query_scalar::<_, String>(&sql).fetch_all(db).await?)
}

/// Values the catalog can currently be filtered by
pub async fn filter_options(db: &SqlitePool) -> ServiceResult<FilterOptions> {
    let (min, max): (Option<f64>, Option<f64>) =
        sqlx::query_as("SELECT MIN(price), MAX(price) FROM listings WHERE active = 1")
            .fetch_one(db)
            .await?;

    let price_range = match (min, max) {
        (Some(min), Some(max)) => PriceRange { min, max },
        _ => DEFAULT_PRICE_RANGE,
    };

    Ok(FilterOptions {
        cities: distinct_values(db, "city").await?,
        car_models: distinct_values(db, "car_model").await?,
        colors: distinct_values(db, "color").await?,
        price_range,
    })
}
