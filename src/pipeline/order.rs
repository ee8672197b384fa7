//! Order metadata decoding, submission payload, and submission result.

use serde::Deserialize;
use tracing::warn;

use crate::config::AccountConfig;
use crate::wire::{absolute_url, excerpt, extract_json, Scalar};
use crate::{AppError, Result};

/// Delivery address returned by order initialization.
#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Address {
    /// Address record id.
    pub id: Scalar,
    /// Recipient name.
    pub name: String,
    /// Province id.
    pub province_id: Scalar,
    /// City id.
    pub city_id: Scalar,
    /// County id.
    pub county_id: Scalar,
    /// Town id.
    pub town_id: Scalar,
    /// Street address.
    pub address_detail: String,
    /// Masked mobile number.
    pub mobile: String,
    /// Key unlocking the masked mobile number.
    pub mobile_key: String,
    /// Recipient email, when on file.
    #[serde(default)]
    pub email: Option<String>,
}

/// Default invoice settings; absent for accounts without an invoice profile.
#[derive(Debug, Clone, Default, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct InvoiceInfo {
    /// Invoice title type.
    #[serde(default)]
    pub invoice_title: Option<Scalar>,
    /// Invoice content type.
    #[serde(default)]
    pub invoice_content_type: Option<Scalar>,
    /// Masked invoice phone.
    #[serde(default)]
    pub invoice_phone: Option<String>,
    /// Key unlocking the masked invoice phone.
    #[serde(default)]
    pub invoice_phone_key: Option<String>,
}

/// Order initialization metadata.
#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct InitInfo {
    /// Saved addresses; the first one is the default.
    #[serde(default)]
    pub address_list: Vec<Address>,
    /// Default invoice settings.
    #[serde(default)]
    pub invoice_info: Option<InvoiceInfo>,
    /// One-time submission token.
    pub token: String,
}

impl InitInfo {
    /// Decode the init response body.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Parse` if the body is not a usable init payload.
    pub fn parse(body: &str) -> Result<Self> {
        extract_json(body)
    }

    /// Default delivery address.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Parse` when the account has no saved address.
    pub fn default_address(&self) -> Result<&Address> {
        self.address_list
            .first()
            .ok_or_else(|| AppError::Parse("order init returned no address".into()))
    }
}

/// Assemble the submission form from account data and init metadata.
///
/// # Errors
///
/// Returns `AppError::Parse` when `init` carries no default address.
pub fn build_order_form(
    sku_id: &str,
    account: &AccountConfig,
    init: &InitInfo,
) -> Result<Vec<(String, String)>> {
    let address = init.default_address()?;
    let invoice = init.invoice_info.clone().unwrap_or_default();
    let has_invoice = init.invoice_info.is_some();

    let text = |value: &Option<Scalar>, fallback: &str| {
        value
            .as_ref()
            .map_or_else(|| fallback.to_owned(), ToString::to_string)
    };

    let fields: Vec<(&str, String)> = vec![
        ("skuId", sku_id.to_owned()),
        ("num", account.seckill_num.to_string()),
        ("addressId", address.id.to_string()),
        ("yuShou", "true".into()),
        ("isModifyAddress", "false".into()),
        ("name", address.name.clone()),
        ("provinceId", address.province_id.to_string()),
        ("cityId", address.city_id.to_string()),
        ("countyId", address.county_id.to_string()),
        ("townId", address.town_id.to_string()),
        ("addressDetail", address.address_detail.clone()),
        ("mobile", address.mobile.clone()),
        ("mobileKey", address.mobile_key.clone()),
        ("email", address.email.clone().unwrap_or_default()),
        ("postCode", String::new()),
        ("invoiceTitle", text(&invoice.invoice_title, "-1")),
        ("invoiceCompanyName", String::new()),
        ("invoiceContent", text(&invoice.invoice_content_type, "1")),
        ("invoiceTaxpayerNO", String::new()),
        ("invoiceEmail", String::new()),
        ("invoicePhone", invoice.invoice_phone.clone().unwrap_or_default()),
        ("invoicePhoneKey", invoice.invoice_phone_key.clone().unwrap_or_default()),
        ("invoice", has_invoice.to_string()),
        ("password", account.payment_pwd.clone()),
        ("codTimeType", "3".into()),
        ("paymentType", "4".into()),
        ("areaCode", String::new()),
        ("overseas", "0".into()),
        ("phone", String::new()),
        ("eid", account.eid.clone()),
        ("fp", account.fp.clone()),
        ("token", init.token.clone()),
        ("pru", String::new()),
    ];

    Ok(fields
        .into_iter()
        .map(|(key, value)| (key.to_owned(), value))
        .collect())
}

/// Placed order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OrderReceipt {
    /// Order identifier; absent when the service confirms without one.
    pub order_id: Option<u64>,
    /// Order total as reported by the service.
    pub total_money: String,
    /// Desktop payment page.
    pub pay_url: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SubmitResponse {
    #[serde(default)]
    success: bool,
    #[serde(default)]
    order_id: Option<Scalar>,
    #[serde(default)]
    total_money: Option<Scalar>,
    #[serde(default)]
    pc_url: Option<String>,
    #[serde(default)]
    result_code: Option<Scalar>,
    #[serde(default)]
    error_message: Option<String>,
}

/// Interpret a submission response body.
///
/// # Errors
///
/// Returns `AppError::Parse` for bodies that are not a submission result,
/// and `AppError::Rejected` when the service reports `success: false`.
/// A `success: true` reply always yields a receipt, even when fields are
/// missing.
pub fn parse_submit_response(body: &str) -> Result<OrderReceipt> {
    let response: SubmitResponse = extract_json(body)?;

    if !response.success {
        return Err(AppError::Rejected {
            code: response
                .result_code
                .as_ref()
                .and_then(Scalar::as_i64)
                .unwrap_or_default(),
            message: response
                .error_message
                .unwrap_or_else(|| excerpt(body)),
        });
    }

    let order_id = response
        .order_id
        .as_ref()
        .and_then(Scalar::as_i64)
        .and_then(|id| u64::try_from(id).ok());
    if order_id.is_none() {
        warn!(body = excerpt(body), "successful submission without order id");
    }
    let pay_url = response.pc_url.as_deref().map(absolute_url).unwrap_or_else(|| {
        warn!(?order_id, "successful submission without payment url");
        String::new()
    });

    Ok(OrderReceipt {
        order_id,
        total_money: response
            .total_money
            .map(|total| total.to_string())
            .unwrap_or_default(),
        pay_url,
    })
}
