//! Carrier code mapping (配送業者)
//!
//! Internal carrier codes are translated to the tracking-company labels the
//! external API recognizes. Unrecognized codes pass through unchanged so new
//! carriers can be onboarded without a code change.

/// Translate an internal carrier code to the external tracking-company label
pub fn tracking_company_for(carrier: &str) -> String {
    match carrier {
        "yamato" => "Yamato (JA)",
        "sagawa" => "Sagawa (JA)",
        "japanpost" => "Japan Post (JA)",
        "dhl" => "DHL Express",
        "fedex" => "FedEx",
        other => other,
    }
    .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn known_codes_map_to_labels() {
        assert_eq!(tracking_company_for("yamato"), "Yamato (JA)");
        assert_eq!(tracking_company_for("sagawa"), "Sagawa (JA)");
        assert_eq!(tracking_company_for("japanpost"), "Japan Post (JA)");
        assert_eq!(tracking_company_for("dhl"), "DHL Express");
        assert_eq!(tracking_company_for("fedex"), "FedEx");
    }

    #[test]
    fn unknown_codes_pass_through() {
        assert_eq!(tracking_company_for("seino"), "seino");
    }
}
