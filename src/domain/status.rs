//! Canonical shipment status vocabulary
//!
//! Tracking providers report checkpoint states as free-text PascalCase tags
//! ("InTransit", "Delivered_003", ...). Everything entering the system is
//! normalized into the closed enums below; any tag outside the mapping
//! becomes `Unknown` rather than an error.

use serde::{Deserialize, Serialize};

/// Top-level status for a shipment
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Status {
    #[serde(rename = "infoReceived")]
    InfoReceived,
    #[serde(rename = "inTransit")]
    InTransit,
    #[serde(rename = "outForDelivery")]
    OutForDelivery,
    #[serde(rename = "attemptFail")]
    AttemptFail,
    #[serde(rename = "delivered")]
    Delivered,
    #[serde(rename = "availableForPickup")]
    AvailableForPickup,
    #[serde(rename = "exception")]
    Exception,
    #[serde(rename = "expired")]
    Expired,
    #[serde(rename = "pending")]
    Pending,
    #[serde(rename = "unknown")]
    Unknown,
}

impl Status {
    pub fn as_str(&self) -> &'static str {
        match self {
            Status::InfoReceived => "infoReceived",
            Status::InTransit => "inTransit",
            Status::OutForDelivery => "outForDelivery",
            Status::AttemptFail => "attemptFail",
            Status::Delivered => "delivered",
            Status::AvailableForPickup => "availableForPickup",
            Status::Exception => "exception",
            Status::Expired => "expired",
            Status::Pending => "pending",
            Status::Unknown => "unknown",
        }
    }

    fn from_raw(raw: &str) -> Option<Self> {
        Some(match raw {
            "infoReceived" => Status::InfoReceived,
            "inTransit" => Status::InTransit,
            "outForDelivery" => Status::OutForDelivery,
            "attemptFail" => Status::AttemptFail,
            "delivered" => Status::Delivered,
            "availableForPickup" => Status::AvailableForPickup,
            "exception" => Status::Exception,
            "expired" => Status::Expired,
            "pending" => Status::Pending,
            "unknown" => Status::Unknown,
            _ => return None,
        })
    }
}

/// Detailed status for a shipment update
///
/// Raw values follow the provider vocabulary (`delivered_003` etc.) so the
/// serialized form matches what clients already consume.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
#[allow(non_camel_case_types)]
pub enum Substatus {
    Delivered_001,
    Delivered_002,
    Delivered_003,
    Delivered_004,
    #[serde(rename = "availableForPickup_001")]
    AvailableForPickup_001,
    Exception_001,
    Exception_002,
    Exception_003,
    Exception_004,
    Exception_005,
    Exception_006,
    Exception_007,
    Exception_008,
    Exception_009,
    Exception_010,
    Exception_011,
    Exception_012,
    Exception_013,
    #[serde(rename = "attemptFail_001")]
    AttemptFail_001,
    #[serde(rename = "attemptFail_002")]
    AttemptFail_002,
    #[serde(rename = "attemptFail_003")]
    AttemptFail_003,
    #[serde(rename = "inTransit_001")]
    InTransit_001,
    #[serde(rename = "inTransit_002")]
    InTransit_002,
    #[serde(rename = "inTransit_003")]
    InTransit_003,
    #[serde(rename = "inTransit_004")]
    InTransit_004,
    #[serde(rename = "inTransit_005")]
    InTransit_005,
    #[serde(rename = "inTransit_006")]
    InTransit_006,
    #[serde(rename = "inTransit_007")]
    InTransit_007,
    #[serde(rename = "inTransit_008")]
    InTransit_008,
    #[serde(rename = "inTransit_009")]
    InTransit_009,
    #[serde(rename = "infoReceived_001")]
    InfoReceived_001,
    #[serde(rename = "outForDelivery_001")]
    OutForDelivery_001,
    #[serde(rename = "outForDelivery_003")]
    OutForDelivery_003,
    #[serde(rename = "outForDelivery_004")]
    OutForDelivery_004,
    Pending_001,
    Pending_002,
    Pending_003,
    Pending_004,
    Pending_005,
    Pending_006,
    Expired_001,
    Unknown,
}

impl Substatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Substatus::Delivered_001 => "delivered_001",
            Substatus::Delivered_002 => "delivered_002",
            Substatus::Delivered_003 => "delivered_003",
            Substatus::Delivered_004 => "delivered_004",
            Substatus::AvailableForPickup_001 => "availableForPickup_001",
            Substatus::Exception_001 => "exception_001",
            Substatus::Exception_002 => "exception_002",
            Substatus::Exception_003 => "exception_003",
            Substatus::Exception_004 => "exception_004",
            Substatus::Exception_005 => "exception_005",
            Substatus::Exception_006 => "exception_006",
            Substatus::Exception_007 => "exception_007",
            Substatus::Exception_008 => "exception_008",
            Substatus::Exception_009 => "exception_009",
            Substatus::Exception_010 => "exception_010",
            Substatus::Exception_011 => "exception_011",
            Substatus::Exception_012 => "exception_012",
            Substatus::Exception_013 => "exception_013",
            Substatus::AttemptFail_001 => "attemptFail_001",
            Substatus::AttemptFail_002 => "attemptFail_002",
            Substatus::AttemptFail_003 => "attemptFail_003",
            Substatus::InTransit_001 => "inTransit_001",
            Substatus::InTransit_002 => "inTransit_002",
            Substatus::InTransit_003 => "inTransit_003",
            Substatus::InTransit_004 => "inTransit_004",
            Substatus::InTransit_005 => "inTransit_005",
            Substatus::InTransit_006 => "inTransit_006",
            Substatus::InTransit_007 => "inTransit_007",
            Substatus::InTransit_008 => "inTransit_008",
            Substatus::InTransit_009 => "inTransit_009",
            Substatus::InfoReceived_001 => "infoReceived_001",
            Substatus::OutForDelivery_001 => "outForDelivery_001",
            Substatus::OutForDelivery_003 => "outForDelivery_003",
            Substatus::OutForDelivery_004 => "outForDelivery_004",
            Substatus::Pending_001 => "pending_001",
            Substatus::Pending_002 => "pending_002",
            Substatus::Pending_003 => "pending_003",
            Substatus::Pending_004 => "pending_004",
            Substatus::Pending_005 => "pending_005",
            Substatus::Pending_006 => "pending_006",
            Substatus::Expired_001 => "expired_001",
            Substatus::Unknown => "unknown",
        }
    }

    fn from_raw(raw: &str) -> Option<Self> {
        Some(match raw {
            "delivered_001" => Substatus::Delivered_001,
            "delivered_002" => Substatus::Delivered_002,
            "delivered_003" => Substatus::Delivered_003,
            "delivered_004" => Substatus::Delivered_004,
            "availableForPickup_001" => Substatus::AvailableForPickup_001,
            "exception_001" => Substatus::Exception_001,
            "exception_002" => Substatus::Exception_002,
            "exception_003" => Substatus::Exception_003,
            "exception_004" => Substatus::Exception_004,
            "exception_005" => Substatus::Exception_005,
            "exception_006" => Substatus::Exception_006,
            "exception_007" => Substatus::Exception_007,
            "exception_008" => Substatus::Exception_008,
            "exception_009" => Substatus::Exception_009,
            "exception_010" => Substatus::Exception_010,
            "exception_011" => Substatus::Exception_011,
            "exception_012" => Substatus::Exception_012,
            "exception_013" => Substatus::Exception_013,
            "attemptFail_001" => Substatus::AttemptFail_001,
            "attemptFail_002" => Substatus::AttemptFail_002,
            "attemptFail_003" => Substatus::AttemptFail_003,
            "inTransit_001" => Substatus::InTransit_001,
            "inTransit_002" => Substatus::InTransit_002,
            "inTransit_003" => Substatus::InTransit_003,
            "inTransit_004" => Substatus::InTransit_004,
            "inTransit_005" => Substatus::InTransit_005,
            "inTransit_006" => Substatus::InTransit_006,
            "inTransit_007" => Substatus::InTransit_007,
            "inTransit_008" => Substatus::InTransit_008,
            "inTransit_009" => Substatus::InTransit_009,
            "infoReceived_001" => Substatus::InfoReceived_001,
            "outForDelivery_001" => Substatus::OutForDelivery_001,
            "outForDelivery_003" => Substatus::OutForDelivery_003,
            "outForDelivery_004" => Substatus::OutForDelivery_004,
            "pending_001" => Substatus::Pending_001,
            "pending_002" => Substatus::Pending_002,
            "pending_003" => Substatus::Pending_003,
            "pending_004" => Substatus::Pending_004,
            "pending_005" => Substatus::Pending_005,
            "pending_006" => Substatus::Pending_006,
            "expired_001" => Substatus::Expired_001,
            "unknown" => Substatus::Unknown,
            _ => return None,
        })
    }
}

/// Lower-case only the first character of a provider tag.
///
/// Providers emit PascalCase tags ("InTransit", "Delivered_003"); the rest of
/// the string is significant and must not be touched.
fn lowercase_first(tag: &str) -> String {
    let mut chars = tag.chars();
    match chars.next() {
        Some(first) => first.to_lowercase().collect::<String>() + chars.as_str(),
        None => String::new(),
    }
}

/// Normalize a provider status tag. Total; unmapped tags become `Unknown`.
pub fn normalize_status(tag: &str) -> Status {
    Status::from_raw(&lowercase_first(tag)).unwrap_or(Status::Unknown)
}

/// Normalize a provider substatus tag. Total; unmapped tags become `Unknown`.
pub fn normalize_substatus(tag: &str) -> Substatus {
    Substatus::from_raw(&lowercase_first(tag)).unwrap_or(Substatus::Unknown)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_status_known_tags() {
        assert_eq!(normalize_status("Delivered"), Status::Delivered);
        assert_eq!(normalize_status("InTransit"), Status::InTransit);
        assert_eq!(normalize_status("OutForDelivery"), Status::OutForDelivery);
        // Already lower-cased input maps too
        assert_eq!(normalize_status("pending"), Status::Pending);
    }

    #[test]
    fn test_normalize_status_unknown_tags() {
        assert_eq!(normalize_status("TotallyMadeUp"), Status::Unknown);
        assert_eq!(normalize_status(""), Status::Unknown);
        assert_eq!(normalize_status("DELIVERED"), Status::Unknown); // only first char folded
    }

    #[test]
    fn test_normalize_substatus_known_tags() {
        assert_eq!(normalize_substatus("Delivered_003"), Substatus::Delivered_003);
        assert_eq!(normalize_substatus("InTransit_007"), Substatus::InTransit_007);
        assert_eq!(normalize_substatus("AvailableForPickup_001"), Substatus::AvailableForPickup_001);
    }

    #[test]
    fn test_normalize_substatus_unknown_tags() {
        assert_eq!(normalize_substatus("delivered_999"), Substatus::Unknown);
        assert_eq!(normalize_substatus(""), Substatus::Unknown);
    }

    #[test]
    fn test_serde_uses_raw_values() {
        assert_eq!(serde_json::to_string(&Status::InfoReceived).unwrap(), "\"infoReceived\"");
        assert_eq!(
            serde_json::to_string(&Substatus::AttemptFail_002).unwrap(),
            "\"attemptFail_002\""
        );
        let s: Substatus = serde_json::from_str("\"outForDelivery_004\"").unwrap();
        assert_eq!(s, Substatus::OutForDelivery_004);
    }

    #[test]
    fn test_as_str_round_trips_through_normalize() {
        for status in [Status::Delivered, Status::Exception, Status::Unknown] {
            assert_eq!(normalize_status(status.as_str()), status);
        }
        for sub in [Substatus::Delivered_003, Substatus::Pending_006, Substatus::Expired_001] {
            assert_eq!(normalize_substatus(sub.as_str()), sub);
        }
    }
}
