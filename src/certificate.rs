use chrono::{DateTime, Utc};
use lopdf::{
    Document, Object, Stream, StringFormat,
    content::{Content, Operation},
    dictionary,
};
use thiserror::Error;
use uuid::Uuid;

use crate::models::CertificateRequest;

#[derive(Debug, Error)]
pub enum CertificateError {
    #[error("pdf encoding error: {0}")]
    Encode(#[from] lopdf::Error),
    #[error("pdf write error: {0}")]
    Write(#[from] std::io::Error),
}

/// CertificateContent
///
/// The request fields printed on an issued certificate.
#[derive(Debug, Clone)]
pub struct CertificateContent {
    pub request_id: Uuid,
    pub certificate_type: String,
    pub first_name: String,
    pub last_name: String,
    pub personal_id: String,
    pub requested_at: DateTime<Utc>,
    pub issued_at: DateTime<Utc>,
}

impl CertificateContent {
    pub fn for_request(request: &CertificateRequest, issued_at: DateTime<Utc>) -> Self {
        Self {
            request_id: request.id,
            certificate_type: request.certificate_type.clone(),
            first_name: request.first_name.clone(),
            last_name: request.last_name.clone(),
            personal_id: request.personal_id.clone(),
            requested_at: request.created_at,
            issued_at,
        }
    }
}

// A4 in points.
const PAGE_WIDTH: i64 = 595;
const PAGE_HEIGHT: i64 = 842;
const MARGIN: i64 = 72;

/// Helvetica with WinAnsiEncoding covers Latin-1; anything outside it prints as '?'.
fn latin1(text: &str) -> Object {
    let bytes = text
        .chars()
        .map(|c| u8::try_from(u32::from(c)).unwrap_or(b'?'))
        .collect();
    Object::String(bytes, StringFormat::Literal)
}

fn text_line(font: &str, size: i64, x: i64, y: i64, text: &str) -> Vec<Operation> {
    vec![
        Operation::new("BT", vec![]),
        Operation::new("Tf", vec![font.into(), Object::Integer(size)]),
        Operation::new("Td", vec![Object::Integer(x), Object::Integer(y)]),
        Operation::new("Tj", vec![latin1(text)]),
        Operation::new("ET", vec![]),
    ]
}

fn page_operations(content: &CertificateContent) -> Vec<Operation> {
    let full_name = format!("{} {}", content.first_name, content.last_name);
    let date = |at: &DateTime<Utc>| at.format("%Y-%m-%d").to_string();

    let lines: [(&str, i64, i64, String); 8] = [
        ("F2", 24, 740, "CERTIFICATE".to_string()),
        ("F1", 14, 700, content.certificate_type.clone()),
        ("F1", 12, 640, "This document certifies that the request filed for".to_string()),
        ("F2", 16, 610, full_name),
        ("F1", 12, 585, format!("Personal ID: {}", content.personal_id)),
        ("F1", 12, 540, format!("Request ID: {}", content.request_id)),
        ("F1", 12, 520, format!("Requested on: {}", date(&content.requested_at))),
        ("F1", 12, 500, format!("Issued on: {}", date(&content.issued_at))),
    ];

    let mut operations = Vec::new();
    // Frame.
    operations.push(Operation::new("w", vec![Object::Integer(2)]));
    operations.push(Operation::new(
        "re",
        vec![
            Object::Integer(MARGIN / 2),
            Object::Integer(MARGIN / 2),
            Object::Integer(PAGE_WIDTH - MARGIN),
            Object::Integer(PAGE_HEIGHT - MARGIN),
        ],
    ));
    operations.push(Operation::new("S", vec![]));

    for (font, size, y, text) in lines.iter() {
        operations.extend(text_line(font, *size, MARGIN, *y, text));
    }
    operations
}

/// render_certificate
///
/// Renders the fixed single-page certificate layout and returns the PDF bytes.
pub fn render_certificate(content: &CertificateContent) -> Result<Vec<u8>, CertificateError> {
    let mut doc = Document::with_version("1.5");
    let pages_id = doc.new_object_id();

    let regular_id = doc.add_object(dictionary! {
        "Type" => "Font",
        "Subtype" => "Type1",
        "BaseFont" => "Helvetica",
        "Encoding" => "WinAnsiEncoding",
    });
    let bold_id = doc.add_object(dictionary! {
        "Type" => "Font",
        "Subtype" => "Type1",
        "BaseFont" => "Helvetica-Bold",
        "Encoding" => "WinAnsiEncoding",
    });
    let resources_id = doc.add_object(dictionary! {
        "Font" => dictionary! {
            "F1" => regular_id,
            "F2" => bold_id,
        },
    });

    let page_content = Content {
        operations: page_operations(content),
    };
    let content_id = doc.add_object(Stream::new(dictionary! {}, page_content.encode()?));

    let page_id = doc.add_object(dictionary! {
        "Type" => "Page",
        "Parent" => pages_id,
        "Contents" => content_id,
    });
    let pages = dictionary! {
        "Type" => "Pages",
        "Kids" => vec![page_id.into()],
        "Count" => Object::Integer(1),
        "Resources" => resources_id,
        "MediaBox" => vec![
            Object::Integer(0),
            Object::Integer(0),
            Object::Integer(PAGE_WIDTH),
            Object::Integer(PAGE_HEIGHT),
        ],
    };
    doc.objects.insert(pages_id, Object::Dictionary(pages));

    let catalog_id = doc.add_object(dictionary! {
        "Type" => "Catalog",
        "Pages" => pages_id,
    });
    doc.trailer.set("Root", catalog_id);
    doc.compress();

    let mut bytes = Vec::new();
    doc.save_to(&mut bytes)?;
    Ok(bytes)
}
