use chrono::{TimeZone, Utc};
use docutrack::certificate::{CertificateContent, render_certificate};
use lopdf::Document;
use uuid::Uuid;

fn content() -> CertificateContent {
    CertificateContent {
        request_id: Uuid::from_u128(42),
        certificate_type: "BIRTH_CERTIFICATE".to_string(),
        first_name: "Ana".to_string(),
        last_name: "Pérez".to_string(),
        personal_id: "12345678".to_string(),
        requested_at: Utc.with_ymd_and_hms(2025, 3, 1, 10, 0, 0).unwrap(),
        issued_at: Utc.with_ymd_and_hms(2025, 3, 4, 9, 30, 0).unwrap(),
    }
}

fn contains(haystack: &[u8], needle: &[u8]) -> bool {
    haystack.windows(needle.len()).any(|window| window == needle)
}

#[test]
fn test_rendered_certificate_is_a_pdf() {
    let bytes = render_certificate(&content()).unwrap();
    assert!(bytes.starts_with(b"%PDF-"));
}

#[test]
fn test_rendered_certificate_has_one_page_with_request_data() {
    let bytes = render_certificate(&content()).unwrap();

    let mut doc = Document::load_mem(&bytes).unwrap();
    doc.decompress();
    let pages = doc.get_pages();
    assert_eq!(pages.len(), 1);

    let page_id = *pages.values().next().unwrap();
    let text = doc.get_page_content(page_id).unwrap();
    assert!(contains(&text, b"(CERTIFICATE)"));
    assert!(contains(&text, b"(BIRTH_CERTIFICATE)"));
    assert!(contains(&text, b"(Personal ID: 12345678)"));
    assert!(contains(&text, b"Issued on: 2025-03-04"));
    assert!(contains(
        &text,
        format!("Request ID: {}", Uuid::from_u128(42)).as_bytes()
    ));
}

#[test]
fn test_characters_outside_latin1_do_not_fail_rendering() {
    let mut content = content();
    content.last_name = "Łukasz 漢字".to_string();
    let bytes = render_certificate(&content).unwrap();
    assert!(bytes.starts_with(b"%PDF-"));
}
