use std::path::Path;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

/// Where a scanned receipt is in the OCR workflow.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "ts", derive(ts_rs::TS), ts(export))]
#[serde(rename_all = "lowercase")]
pub enum ProcessingStatus {
    Pending,
    Processing,
    Processed,
    Accepted,
    Rejected,
    Failed,
    #[serde(other)]
    Unknown,
}

impl ProcessingStatus {
    /// No further polling is useful once a receipt reaches one of these.
    pub fn is_terminal(&self) -> bool {
        !matches!(self, ProcessingStatus::Pending | ProcessingStatus::Processing)
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct ReceiptUploadResponse {
    pub ocr_id: String,
    #[serde(default)]
    pub status: Option<ProcessingStatus>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ReceiptStatus {
    #[serde(default)]
    pub ocr_id: Option<String>,
    pub status: ProcessingStatus,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "ts", derive(ts_rs::TS), ts(export))]
pub struct OcrItem {
    pub name: String,
    pub quantity: f64,
    pub unit_price: String,
    pub total_price: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "ts", derive(ts_rs::TS), ts(export))]
pub struct OcrConfidence {
    pub field_name: String,
    pub confidence_score: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "ts", derive(ts_rs::TS), ts(export))]
pub struct OcrResult {
    pub ocr_id: String,
    pub merchant_name: Option<String>,
    pub total_amount: Option<String>,
    pub transaction_date: Option<String>,
    pub payment_method: Option<String>,
    #[serde(default)]
    pub items: Vec<OcrItem>,
    #[serde(default)]
    pub confidence_scores: Option<Vec<OcrConfidence>>,
    #[serde(default)]
    pub image_url: Option<String>,
    pub receipt_status: ProcessingStatus,
}

impl OcrResult {
    /// Start an acceptance body from what the OCR pass extracted.
    pub fn to_accept_request(&self) -> AcceptOcrRequest {
        AcceptOcrRequest {
            merchant_name: self.merchant_name.clone(),
            total_amount: self.total_amount.clone(),
            transaction_date: self.transaction_date.clone(),
            payment_method: self.payment_method.clone(),
            category_id: None,
            user_category_id: None,
            items: self.items.clone(),
            notes: None,
        }
    }
}

/// Confirmed (possibly corrected) OCR fields that become an expense.
#[derive(Debug, Clone, Serialize)]
pub struct AcceptOcrRequest {
    pub merchant_name: Option<String>,
    pub total_amount: Option<String>,
    pub transaction_date: Option<String>,
    pub payment_method: Option<String>,
    pub category_id: Option<String>,
    pub user_category_id: Option<String>,
    pub items: Vec<OcrItem>,
    pub notes: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct OcrCorrection {
    pub field_name: String,
    pub original_value: String,
    pub corrected_value: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct OcrFeedbackRequest {
    pub corrections: Vec<OcrCorrection>,
}

/// An image to upload as a multipart part.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReceiptImage {
    pub file_name: String,
    pub mime_type: String,
    pub bytes: Vec<u8>,
}

impl ReceiptImage {
    pub fn from_path(path: &Path) -> Result<Self> {
        let bytes = std::fs::read(path)
            .with_context(|| format!("Failed to read receipt image {}", path.display()))?;
        let file_name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "receipt.jpg".to_string());
        let mime_type = Self::mime_for(&file_name).to_string();
        Ok(Self {
            file_name,
            mime_type,
            bytes,
        })
    }

    fn mime_for(file_name: &str) -> &'static str {
        let ext = file_name
            .rsplit_once('.')
            .map(|(_, ext)| ext.to_ascii_lowercase())
            .unwrap_or_default();
        match ext.as_str() {
            "png" => "image/png",
            "heic" => "image/heic",
            "webp" => "image/webp",
            "pdf" => "application/pdf",
            _ => "image/jpeg",
        }
    }
}
