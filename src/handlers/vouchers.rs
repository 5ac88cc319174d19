use serde::Deserialize;
use serde_json::json;
use worker::*;

use crate::auth::require_admin;
use crate::config::Config;
use crate::db::{database, flag, nullable};
use crate::error::{read_json, ApiError, ApiResult};
use crate::handlers::{created, deleted, insert_error, json_response, path_param};
use crate::models::{Voucher, VoucherRow};

const VOUCHER_COLUMNS: &str = "code, type, discount_percent, discount, min_order, max_discount, \
     description, expires_at, image_url, is_active";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VoucherKind {
    Percentage,
    Fixed,
}

impl VoucherKind {
    pub fn as_str(self) -> &'static str {
        match self {
            VoucherKind::Percentage => "percentage",
            VoucherKind::Fixed => "fixed",
        }
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VoucherInput {
    pub code: Option<String>,
    #[serde(rename = "type")]
    pub kind: Option<String>,
    #[serde(alias = "discount_percent")]
    pub discount_percent: Option<i32>,
    pub discount: Option<i32>,
    #[serde(alias = "min_order")]
    pub min_order: Option<i32>,
    #[serde(alias = "max_discount")]
    pub max_discount: Option<i32>,
    pub description: Option<String>,
    #[serde(alias = "expires_at")]
    pub expires_at: Option<String>,
    #[serde(alias = "image_url")]
    pub image_url: Option<String>,
    #[serde(alias = "is_active")]
    pub is_active: Option<bool>,
}

impl VoucherInput {
    /// Resolves the discount kind and keeps only the amount that belongs to it.
    pub fn into_voucher(self, code: Option<String>) -> ApiResult<Voucher> {
        let code = normalize_code(code.or(self.code).as_deref())
            .ok_or_else(|| ApiError::bad_request("code is required"))?;

        let kind = match self.kind.as_deref().map(str::trim) {
            Some("percentage") | Some("percent") => VoucherKind::Percentage,
            Some("fixed") => VoucherKind::Fixed,
            Some(other) if !other.is_empty() => {
                return Err(ApiError::bad_request(format!(
                    "Invalid voucher type '{other}'. Valid options: percentage, fixed"
                )))
            }
            _ if self.discount_percent.is_some() => VoucherKind::Percentage,
            _ if self.discount.is_some() => VoucherKind::Fixed,
            _ => return Err(ApiError::bad_request("discountPercent or discount is required")),
        };

        let (discount_percent, discount) = match kind {
            VoucherKind::Percentage => {
                let pct = self
                    .discount_percent
                    .ok_or_else(|| ApiError::bad_request("discountPercent is required"))?;
                if !(1..=100).contains(&pct) {
                    return Err(ApiError::bad_request("discountPercent must be between 1 and 100"));
                }
                (Some(pct), None)
            }
            VoucherKind::Fixed => {
                let amount = self
                    .discount
                    .ok_or_else(|| ApiError::bad_request("discount is required"))?;
                if amount <= 0 {
                    return Err(ApiError::bad_request("discount must be positive"));
                }
                (None, Some(amount))
            }
        };

        let min_order = self.min_order.unwrap_or(0);
        if min_order < 0 || self.max_discount.is_some_and(|max| max < 0) {
            return Err(ApiError::bad_request("minOrder and maxDiscount must not be negative"));
        }
        if let Some(expires_at) = self.expires_at.as_deref().filter(|s| !s.trim().is_empty()) {
            if crate::db::parse_timestamp(expires_at).is_none()
                && chrono::NaiveDate::parse_from_str(expires_at.trim(), "%Y-%m-%d").is_err()
            {
                return Err(ApiError::bad_request("expiresAt must be a date or RFC 3339 timestamp"));
            }
        }
        let text = |value: Option<String>| value.map(|v| v.trim().to_string()).filter(|v| !v.is_empty());

        Ok(Voucher {
            code,
            kind: kind.as_str().to_string(),
            discount_percent,
            discount,
            min_order,
            max_discount: self.max_discount,
            description: text(self.description),
            expires_at: text(self.expires_at),
            image_url: text(self.image_url),
            is_active: self.is_active.unwrap_or(true),
        })
    }
}

pub fn normalize_code(code: Option<&str>) -> Option<String> {
    code.map(|c| c.trim().to_uppercase()).filter(|c| !c.is_empty())
}

pub async fn list_vouchers(_req: Request, ctx: RouteContext<Config>) -> ApiResult<Response> {
    let d1 = database(&ctx)?;
    let vouchers: Vec<Voucher> = d1
        .prepare(&format!("SELECT {VOUCHER_COLUMNS} FROM vouchers ORDER BY code ASC"))
        .all()
        .await?
        .results::<VoucherRow>()?
        .into_iter()
        .map(Voucher::from)
        .collect();
    json_response(&json!({ "vouchers": vouchers }))
}

pub async fn get_voucher(_req: Request, ctx: RouteContext<Config>) -> ApiResult<Response> {
    let code = normalize_code(Some(&path_param(&ctx, "code")?))
        .ok_or_else(|| ApiError::bad_request("code is required"))?;
    let d1 = database(&ctx)?;

    let voucher = d1
        .prepare(&format!("SELECT {VOUCHER_COLUMNS} FROM vouchers WHERE code = ?1"))
        .bind(&[code.into()])?
        .first::<VoucherRow>(None)
        .await?;

    match voucher {
        Some(row) => json_response(&json!({ "voucher": Voucher::from(row) })),
        None => Err(ApiError::not_found("Voucher not found")),
    }
}

pub async fn create_voucher(mut req: Request, ctx: RouteContext<Config>) -> ApiResult<Response> {
    require_admin(&req, &ctx)?;
    let voucher = read_json::<VoucherInput>(&mut req).await?.into_voucher(None)?;
    let d1 = database(&ctx)?;

    d1.prepare(&format!(
        "INSERT INTO vouchers ({VOUCHER_COLUMNS}) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)"
    ))
    .bind(&[
        voucher.code.as_str().into(),
        voucher.kind.as_str().into(),
        nullable(voucher.discount_percent),
        nullable(voucher.discount),
        voucher.min_order.into(),
        nullable(voucher.max_discount),
        nullable(voucher.description.clone()),
        nullable(voucher.expires_at.clone()),
        nullable(voucher.image_url.clone()),
        flag(voucher.is_active),
    ])?
    .run()
    .await
    .map_err(|e| insert_error(e, "Voucher code"))?;

    tracing::info!(code = %voucher.code, kind = %voucher.kind, "voucher created");
    created(&json!({ "success": true, "voucher": voucher }))
}

pub async fn update_voucher(mut req: Request, ctx: RouteContext<Config>) -> ApiResult<Response> {
    require_admin(&req, &ctx)?;
    let code = path_param(&ctx, "code")?;
    let voucher = read_json::<VoucherInput>(&mut req).await?.into_voucher(Some(code))?;
    let d1 = database(&ctx)?;

    let updated = d1
        .prepare(&format!(
            "UPDATE vouchers SET type = ?1, discount_percent = ?2, discount = ?3, min_order = ?4, \
             max_discount = ?5, description = ?6, expires_at = ?7, image_url = ?8, is_active = ?9 \
             WHERE code = ?10 RETURNING {VOUCHER_COLUMNS}"
        ))
        .bind(&[
            voucher.kind.as_str().into(),
            nullable(voucher.discount_percent),
            nullable(voucher.discount),
            voucher.min_order.into(),
            nullable(voucher.max_discount),
            nullable(voucher.description),
            nullable(voucher.expires_at),
            nullable(voucher.image_url),
            flag(voucher.is_active),
            voucher.code.as_str().into(),
        ])?
        .first::<VoucherRow>(None)
        .await?;

    match updated {
        Some(row) => json_response(&json!({ "success": true, "voucher": Voucher::from(row) })),
        None => Err(ApiError::not_found("Voucher not found")),
    }
}

pub async fn delete_voucher(req: Request, ctx: RouteContext<Config>) -> ApiResult<Response> {
    require_admin(&req, &ctx)?;
    let code = normalize_code(Some(&path_param(&ctx, "code")?))
        .ok_or_else(|| ApiError::bad_request("code is required"))?;
    let d1 = database(&ctx)?;

    let removed = d1
        .prepare("DELETE FROM vouchers WHERE code = ?1 RETURNING code")
        .bind(&[code.into()])?
        .first::<String>(Some("code"))
        .await?;

    match removed {
        Some(_) => deleted(),
        None => Err(ApiError::not_found("Voucher not found")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::Value;

    fn voucher(body: Value) -> ApiResult<Voucher> {
        serde_json::from_value::<VoucherInput>(body).unwrap().into_voucher(None)
    }

    #[test]
    fn percentage_voucher_keeps_only_the_percent() {
        let v = voucher(json!({
            "code": " welcome10 ",
            "type": "percentage",
            "discountPercent": 10,
            "discount": 20000,
            "minOrder": 50000,
            "maxDiscount": 30000,
            "isActive": true
        }))
        .unwrap();

        assert_eq!(v.code, "WELCOME10");
        assert_eq!(v.kind, "percentage");
        assert_eq!(v.discount_percent, Some(10));
        assert_eq!(v.discount, None);
        assert_eq!(v.max_discount, Some(30000));
    }

    #[test]
    fn fixed_voucher_keeps_only_the_amount() {
        let v = voucher(json!({
            "code": "SAVE20K",
            "type": "fixed",
            "discountPercent": null,
            "discount": 20000,
            "minOrder": 0
        }))
        .unwrap();

        assert_eq!(v.discount, Some(20000));
        assert_eq!(v.discount_percent, None);
        let json = serde_json::to_value(&v).unwrap();
        assert!(json["discountPercent"].is_null());
        assert_eq!(json["type"], "fixed");
    }

    #[test]
    fn exactly_one_amount_for_every_type() {
        let bodies = [
            json!({"code": "A", "type": "percentage", "discountPercent": 5, "discount": 100}),
            json!({"code": "B", "type": "fixed", "discountPercent": 5, "discount": 100}),
            json!({"code": "C", "discountPercent": 15}),
            json!({"code": "D", "discount": 5000}),
        ];
        for body in bodies {
            let v = voucher(body).unwrap();
            assert!(v.discount_percent.is_some() ^ v.discount.is_some(), "{}", v.code);
            match v.kind.as_str() {
                "percentage" => assert!(v.discount_percent.is_some()),
                "fixed" => assert!(v.discount.is_some()),
                other => panic!("unexpected kind {other}"),
            }
        }
    }

    #[test]
    fn type_is_inferred_from_the_amount() {
        assert_eq!(voucher(json!({"code": "P", "discountPercent": 25})).unwrap().kind, "percentage");
        assert_eq!(voucher(json!({"code": "F", "discount": 10000})).unwrap().kind, "fixed");
        assert!(voucher(json!({"code": "N"})).is_err());
    }

    #[test]
    fn rejects_bad_amounts_and_types() {
        assert!(voucher(json!({"code": "X", "type": "percentage", "discountPercent": 0})).is_err());
        assert!(voucher(json!({"code": "X", "type": "percentage", "discountPercent": 101})).is_err());
        assert!(voucher(json!({"code": "X", "type": "percentage", "discount": 5000})).is_err());
        assert!(voucher(json!({"code": "X", "type": "fixed", "discount": 0})).is_err());
        assert!(voucher(json!({"code": "X", "type": "bogo", "discount": 1})).is_err());
        assert!(voucher(json!({"code": "X", "discount": 1, "minOrder": -1})).is_err());
        assert!(voucher(json!({"type": "fixed", "discount": 1})).is_err());
    }

    #[test]
    fn expiry_accepts_dates_and_timestamps() {
        assert!(voucher(json!({"code": "E", "discount": 1, "expiresAt": "2026-12-31"})).is_ok());
        assert!(voucher(json!({"code": "E", "discount": 1, "expiresAt": "2026-12-31T23:59:00Z"})).is_ok());
        assert!(voucher(json!({"code": "E", "discount": 1, "expiresAt": "soon"})).is_err());
        let v = voucher(json!({"code": "E", "discount": 1, "expiresAt": ""})).unwrap();
        assert_eq!(v.expires_at, None);
    }

    #[test]
    fn path_code_overrides_body() {
        let input: VoucherInput =
            serde_json::from_value(json!({"code": "OLD", "discount": 1000})).unwrap();
        assert_eq!(input.into_voucher(Some("summer".into())).unwrap().code, "SUMMER");
    }
}
