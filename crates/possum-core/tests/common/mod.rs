#![allow(dead_code)]

use std::sync::Arc;

use possum_core::{Header, MessageSender, Outbox, Possum, RequestDetails, ResourceType};

pub const TAB: i64 = 1;
pub const PAGE: &str = "https://firstparty.test/";
pub const SCRIPT: &str = "https://thirdparty.test/script.js";
pub const FIRST_PARTY_SCRIPT: &str = "https://firstparty.test/script.js";

pub fn main_frame() -> RequestDetails {
    RequestDetails::new(PAGE, TAB, 0, ResourceType::MainFrame)
}

pub fn script() -> RequestDetails {
    RequestDetails::new(SCRIPT, TAB, 0, ResourceType::Script)
}

pub fn first_party_script() -> RequestDetails {
    RequestDetails::new(FIRST_PARTY_SCRIPT, TAB, 0, ResourceType::Script)
}

pub fn cookie() -> Header {
    Header::new("Cookie", "session=abc")
}

pub fn not_cookie() -> Header {
    Header::new("Accept-Language", "en")
}

pub fn req_headers(details: RequestDetails) -> RequestDetails {
    details.with_request_headers(vec![cookie(), not_cookie()])
}

pub fn resp_headers(details: RequestDetails) -> RequestDetails {
    details.with_response_headers(vec![cookie(), not_cookie()])
}

/// The frame a content script reports from
pub fn to_sender(details: &RequestDetails) -> MessageSender {
    MessageSender::frame(details.tab_id, details.frame_id)
}

pub fn possum_with_outbox() -> (Possum, Outbox) {
    let outbox = Outbox::new();
    let possum = Possum::new().with_messenger(Arc::new(outbox.clone()));
    (possum, outbox)
}
