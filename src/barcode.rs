//! Decoded barcode model and structured payload classification

use crate::geometry::Rect;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BarcodeFormat {
    Unknown,
    Code128,
    Code39,
    Code93,
    Codabar,
    DataMatrix,
    Ean13,
    Ean8,
    Itf,
    QrCode,
    UpcA,
    UpcE,
    Pdf417,
    Aztec,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BarcodeType {
    Unknown,
    ContactInfo,
    Email,
    Isbn,
    Phone,
    Product,
    Sms,
    Text,
    Url,
    Wifi,
    Geo,
    CalendarEvent,
    DriverLicense,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Point {
    pub x: f32,
    pub y: f32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WifiEncryption {
    Open,
    Wpa,
    Wep,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct ContactInfo {
    pub name: Option<String>,
    pub organization: Option<String>,
    pub title: Option<String>,
    pub phones: Vec<String>,
    pub emails: Vec<String>,
    pub urls: Vec<String>,
    pub addresses: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct CalendarEvent {
    pub summary: Option<String>,
    pub description: Option<String>,
    pub location: Option<String>,
    pub organizer: Option<String>,
    pub status: Option<String>,
    pub start: Option<String>,
    pub end: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct DriverLicense {
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub license_number: Option<String>,
    pub birth_date: Option<String>,
    pub expiry_date: Option<String>,
    pub issuing_country: Option<String>,
}

/// Type-specific content carried by a barcode
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum BarcodePayload {
    Text,
    Url {
        url: String,
        title: Option<String>,
    },
    Wifi {
        ssid: String,
        password: Option<String>,
        encryption: WifiEncryption,
    },
    Email {
        address: String,
        subject: Option<String>,
        body: Option<String>,
    },
    Phone {
        number: String,
    },
    Sms {
        phone_number: String,
        message: Option<String>,
    },
    GeoPoint {
        latitude: f64,
        longitude: f64,
    },
    ContactInfo(ContactInfo),
    CalendarEvent(CalendarEvent),
    DriverLicense(DriverLicense),
}

impl BarcodePayload {
    pub fn barcode_type(&self) -> BarcodeType {
        match self {
            BarcodePayload::Text => BarcodeType::Text,
            BarcodePayload::Url { .. } => BarcodeType::Url,
            BarcodePayload::Wifi { .. } => BarcodeType::Wifi,
            BarcodePayload::Email { .. } => BarcodeType::Email,
            BarcodePayload::Phone { .. } => BarcodeType::Phone,
            BarcodePayload::Sms { .. } => BarcodeType::Sms,
            BarcodePayload::GeoPoint { .. } => BarcodeType::Geo,
            BarcodePayload::ContactInfo(_) => BarcodeType::ContactInfo,
            BarcodePayload::CalendarEvent(_) => BarcodeType::CalendarEvent,
            BarcodePayload::DriverLicense(_) => BarcodeType::DriverLicense,
        }
    }
}

/// A single decoded barcode
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BarcodeResult {
    pub raw_value: Option<String>,
    pub display_value: Option<String>,
    pub raw_bytes: Option<Vec<u8>>,
    pub format: BarcodeFormat,
    pub value_type: BarcodeType,
    pub bounding_box: Option<Rect>,
    pub corners: Vec<Point>,
    pub payload: Option<BarcodePayload>,
}

impl BarcodeResult {
    /// Build a result from decoded text, classifying its payload
    pub fn from_text(format: BarcodeFormat, text: impl Into<String>) -> Self {
        let text = text.into();
        let payload = parse_payload(&text);
        Self {
            raw_bytes: Some(text.as_bytes().to_vec()),
            display_value: Some(text.clone()),
            raw_value: Some(text),
            format,
            value_type: payload.barcode_type(),
            bounding_box: None,
            corners: Vec::new(),
            payload: Some(payload),
        }
    }

    /// Attach corner points and derive the bounding box from them
    pub fn with_corners(mut self, corners: Vec<Point>) -> Self {
        self.bounding_box = bounding_box_of(&corners);
        self.corners = corners;
        self
    }

    pub fn with_bounding_box(mut self, bounding_box: Rect) -> Self {
        self.bounding_box = Some(bounding_box);
        self
    }

    /// Raw value when present and non-empty
    pub fn value(&self) -> Option<&str> {
        self.raw_value.as_deref().filter(|v| !v.is_empty())
    }
}

fn bounding_box_of(corners: &[Point]) -> Option<Rect> {
    let first = corners.first()?;
    let (mut min_x, mut min_y, mut max_x, mut max_y) = (first.x, first.y, first.x, first.y);
    for p in &corners[1..] {
        min_x = min_x.min(p.x);
        min_y = min_y.min(p.y);
        max_x = max_x.max(p.x);
        max_y = max_y.max(p.y);
    }
    Some(Rect::new(
        min_x.floor() as i32,
        min_y.floor() as i32,
        max_x.ceil() as i32,
        max_y.ceil() as i32,
    ))
}

/// Classify decoded text into a structured payload
pub fn parse_payload(text: &str) -> BarcodePayload {
    let trimmed = text.trim();
    let upper = trimmed.to_ascii_uppercase();

    if upper.starts_with("HTTP://") || upper.starts_with("HTTPS://") {
        return BarcodePayload::Url {
            url: trimmed.to_string(),
            title: None,
        };
    }
    if let Some(url) = strip_prefix_ci(trimmed, "URLTO:") {
        return BarcodePayload::Url {
            url: url.to_string(),
            title: None,
        };
    }
    if let Some(body) = strip_prefix_ci(trimmed, "WIFI:") {
        if let Some(wifi) = parse_wifi(body) {
            return wifi;
        }
    }
    if let Some(rest) = strip_prefix_ci(trimmed, "MAILTO:") {
        return parse_mailto(rest);
    }
    if let Some(rest) = strip_prefix_ci(trimmed, "MATMSG:") {
        return parse_matmsg(rest);
    }
    if let Some(number) = strip_prefix_ci(trimmed, "TEL:") {
        return BarcodePayload::Phone {
            number: number.to_string(),
        };
    }
    if let Some(rest) = strip_prefix_ci(trimmed, "SMSTO:")
        .or_else(|| strip_prefix_ci(trimmed, "SMS:"))
    {
        let (phone_number, message) = match rest.split_once(':') {
            Some((number, message)) => (number, non_empty(message)),
            None => (rest, None),
        };
        return BarcodePayload::Sms {
            phone_number: phone_number.to_string(),
            message,
        };
    }
    if let Some(rest) = strip_prefix_ci(trimmed, "GEO:") {
        if let Some(geo) = parse_geo(rest) {
            return geo;
        }
    }
    if upper.starts_with("BEGIN:VCARD") {
        return BarcodePayload::ContactInfo(parse_vcard(trimmed));
    }
    if upper.starts_with("BEGIN:VEVENT") || upper.starts_with("BEGIN:VCALENDAR") {
        return BarcodePayload::CalendarEvent(parse_vevent(trimmed));
    }

    BarcodePayload::Text
}

fn strip_prefix_ci<'a>(text: &'a str, prefix: &str) -> Option<&'a str> {
    if text.len() >= prefix.len()
        && text.is_char_boundary(prefix.len())
        && text[..prefix.len()].eq_ignore_ascii_case(prefix)
    {
        Some(&text[prefix.len()..])
    } else {
        None
    }
}

fn non_empty(value: &str) -> Option<String> {
    let value = value.trim();
    (!value.is_empty()).then(|| value.to_string())
}

/// Split `K:V;K:V;` fields honouring backslash escapes
fn split_fields(body: &str) -> Vec<(String, String)> {
    let mut fields = Vec::new();
    let mut current = String::new();
    let mut escaped = false;

    for c in body.chars() {
        if escaped {
            current.push(c);
            escaped = false;
        } else if c == '\\' {
            escaped = true;
        } else if c == ';' {
            if let Some((key, value)) = current.split_once(':') {
                fields.push((key.to_ascii_uppercase(), value.to_string()));
            }
            current.clear();
        } else {
            current.push(c);
        }
    }
    if let Some((key, value)) = current.split_once(':') {
        fields.push((key.to_ascii_uppercase(), value.to_string()));
    }

    fields
}

fn parse_wifi(body: &str) -> Option<BarcodePayload> {
    let mut ssid = None;
    let mut password = None;
    let mut encryption = WifiEncryption::Open;

    for (key, value) in split_fields(body) {
        match key.as_str() {
            "S" => ssid = Some(value),
            "P" => password = non_empty(&value),
            "T" => {
                encryption = match value.to_ascii_uppercase().as_str() {
                    "WEP" => WifiEncryption::Wep,
                    "WPA" | "WPA2" | "WPA3" | "SAE" => WifiEncryption::Wpa,
                    _ => WifiEncryption::Open,
                }
            }
            _ => {}
        }
    }

    Some(BarcodePayload::Wifi {
        ssid: ssid?,
        password,
        encryption,
    })
}

fn parse_mailto(rest: &str) -> BarcodePayload {
    let (address, query) = match rest.split_once('?') {
        Some((address, query)) => (address, Some(query)),
        None => (rest, None),
    };

    let mut subject = None;
    let mut body = None;
    for pair in query.unwrap_or_default().split('&') {
        match pair.split_once('=') {
            Some((key, value)) if key.eq_ignore_ascii_case("subject") => subject = non_empty(value),
            Some((key, value)) if key.eq_ignore_ascii_case("body") => body = non_empty(value),
            _ => {}
        }
    }

    BarcodePayload::Email {
        address: address.to_string(),
        subject,
        body,
    }
}

fn parse_matmsg(rest: &str) -> BarcodePayload {
    let mut address = String::new();
    let mut subject = None;
    let mut body = None;
    for (key, value) in split_fields(rest) {
        match key.as_str() {
            "TO" => address = value,
            "SUB" => subject = non_empty(&value),
            "BODY" => body = non_empty(&value),
            _ => {}
        }
    }
    BarcodePayload::Email {
        address,
        subject,
        body,
    }
}

fn parse_geo(rest: &str) -> Option<BarcodePayload> {
    let coords = rest.split(['?', ';']).next()?;
    let mut parts = coords.split(',');
    let latitude = parts.next()?.trim().parse::<f64>().ok()?;
    let longitude = parts.next()?.trim().parse::<f64>().ok()?;
    Some(BarcodePayload::GeoPoint {
        latitude,
        longitude,
    })
}

/// Iterate `NAME;PARAMS:VALUE` content lines of a vCard/iCalendar block
fn content_lines(text: &str) -> impl Iterator<Item = (String, String)> + '_ {
    text.lines().filter_map(|line| {
        let (head, value) = line.trim().split_once(':')?;
        let name = head.split(';').next().unwrap_or(head).to_ascii_uppercase();
        Some((name, value.trim().to_string()))
    })
}

fn parse_vcard(text: &str) -> ContactInfo {
    let mut contact = ContactInfo::default();
    for (name, value) in content_lines(text) {
        match name.as_str() {
            "FN" => contact.name = non_empty(&value),
            "N" if contact.name.is_none() => {
                let parts: Vec<&str> = value.split(';').filter(|p| !p.is_empty()).collect();
                let formatted = parts.iter().rev().copied().collect::<Vec<_>>().join(" ");
                contact.name = non_empty(&formatted);
            }
            "ORG" => contact.organization = non_empty(&value),
            "TITLE" => contact.title = non_empty(&value),
            "TEL" => contact.phones.push(value),
            "EMAIL" => contact.emails.push(value),
            "URL" => contact.urls.push(value),
            "ADR" => {
                let address = value
                    .split(';')
                    .filter(|p| !p.is_empty())
                    .collect::<Vec<_>>()
                    .join(", ");
                if !address.is_empty() {
                    contact.addresses.push(address);
                }
            }
            _ => {}
        }
    }
    contact
}

fn parse_vevent(text: &str) -> CalendarEvent {
    let mut event = CalendarEvent::default();
    for (name, value) in content_lines(text) {
        match name.as_str() {
            "SUMMARY" => event.summary = non_empty(&value),
            "DESCRIPTION" => event.description = non_empty(&value),
            "LOCATION" => event.location = non_empty(&value),
            "ORGANIZER" => event.organizer = non_empty(&value),
            "STATUS" => event.status = non_empty(&value),
            "DTSTART" => event.start = non_empty(&value),
            "DTEND" => event.end = non_empty(&value),
            _ => {}
        }
    }
    event
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_url_payload() {
        let result = BarcodeResult::from_text(BarcodeFormat::QrCode, "https://example.com/a");
        assert_eq!(result.value_type, BarcodeType::Url);
        assert_eq!(
            result.payload,
            Some(BarcodePayload::Url {
                url: "https://example.com/a".to_string(),
                title: None
            })
        );
    }

    #[test]
    fn test_wifi_payload_with_escapes() {
        let payload = parse_payload(r"WIFI:T:WPA;S:home\;net;P:secret;;");
        assert_eq!(
            payload,
            BarcodePayload::Wifi {
                ssid: "home;net".to_string(),
                password: Some("secret".to_string()),
                encryption: WifiEncryption::Wpa,
            }
        );
    }

    #[test]
    fn test_email_and_phone_payloads() {
        assert_eq!(
            parse_payload("mailto:a@b.c?subject=Hi&body=There"),
            BarcodePayload::Email {
                address: "a@b.c".to_string(),
                subject: Some("Hi".to_string()),
                body: Some("There".to_string()),
            }
        );
        assert_eq!(
            parse_payload("tel:+15551234"),
            BarcodePayload::Phone {
                number: "+15551234".to_string()
            }
        );
        assert_eq!(
            parse_payload("SMSTO:5551234:on my way"),
            BarcodePayload::Sms {
                phone_number: "5551234".to_string(),
                message: Some("on my way".to_string()),
            }
        );
    }

    #[test]
    fn test_geo_payload() {
        assert_eq!(
            parse_payload("geo:52.37,4.89?q=Amsterdam"),
            BarcodePayload::GeoPoint {
                latitude: 52.37,
                longitude: 4.89
            }
        );
        assert_eq!(parse_payload("geo:not-a-number"), BarcodePayload::Text);
    }

    #[test]
    fn test_vcard_payload() {
        let text = "BEGIN:VCARD\nVERSION:3.0\nN:Doe;Jane\nORG:Acme\nTEL;TYPE=CELL:555\nEMAIL:jane@acme.test\nEND:VCARD";
        match parse_payload(text) {
            BarcodePayload::ContactInfo(contact) => {
                assert_eq!(contact.name.as_deref(), Some("Jane Doe"));
                assert_eq!(contact.organization.as_deref(), Some("Acme"));
                assert_eq!(contact.phones, vec!["555".to_string()]);
                assert_eq!(contact.emails, vec!["jane@acme.test".to_string()]);
            }
            other => panic!("Unexpected payload: {:?}", other),
        }
    }

    #[test]
    fn test_vevent_payload() {
        let text = "BEGIN:VEVENT\nSUMMARY:Standup\nDTSTART:20260101T090000Z\nDTEND:20260101T091500Z\nEND:VEVENT";
        match parse_payload(text) {
            BarcodePayload::CalendarEvent(event) => {
                assert_eq!(event.summary.as_deref(), Some("Standup"));
                assert_eq!(event.start.as_deref(), Some("20260101T090000Z"));
                assert_eq!(event.end.as_deref(), Some("20260101T091500Z"));
            }
            other => panic!("Unexpected payload: {:?}", other),
        }
    }

    #[test]
    fn test_plain_text_payload() {
        let result = BarcodeResult::from_text(BarcodeFormat::Code128, "ABC-123");
        assert_eq!(result.value_type, BarcodeType::Text);
        assert_eq!(result.value(), Some("ABC-123"));
    }

    #[test]
    fn test_bounding_box_from_corners() {
        let result = BarcodeResult::from_text(BarcodeFormat::QrCode, "x").with_corners(vec![
            Point { x: 10.0, y: 12.0 },
            Point { x: 40.5, y: 11.0 },
            Point { x: 41.0, y: 39.2 },
            Point { x: 9.5, y: 40.0 },
        ]);
        assert_eq!(result.bounding_box, Some(Rect::new(9, 11, 41, 40)));
    }

    #[test]
    fn test_empty_value_is_none() {
        let mut result = BarcodeResult::from_text(BarcodeFormat::QrCode, "");
        assert_eq!(result.value(), None);
        result.raw_value = None;
        assert_eq!(result.value(), None);
    }
}
