use matrixfeed_core::*;
use pretty_assertions::assert_eq;

const SUNNY: &str = "08221C551C220800";
const CLOUDY: &str = "0018264399660000";
const RAINY: &str = "0814225508082810";

fn hex(payload: IconPayload) -> String {
    payload.to_string()
}

#[test]
fn every_known_category_maps_to_its_bitmap() {
    for qualifier in ['d', 'n'] {
        for prefix in ["01", "02"] {
            assert_eq!(hex(map_icon_to_payload(&format!("{prefix}{qualifier}")).unwrap()), SUNNY);
        }
        for prefix in ["03", "04"] {
            assert_eq!(hex(map_icon_to_payload(&format!("{prefix}{qualifier}")).unwrap()), CLOUDY);
        }
        for prefix in ["09", "10", "11", "13", "50"] {
            assert_eq!(hex(map_icon_to_payload(&format!("{prefix}{qualifier}")).unwrap()), RAINY);
        }
    }
}

#[test]
fn every_other_prefix_is_rejected() {
    let known = ["01", "02", "03", "04", "09", "10", "11", "13", "50"];
    for n in 0..100 {
        let prefix = format!("{:02}", n);
        if known.contains(&prefix.as_str()) {
            continue;
        }
        let code = format!("{prefix}d");
        assert!(
            matches!(map_icon_to_payload(&code), Err(IconError::UnknownCategory { .. })),
            "{code} should be rejected"
        );
    }
    assert!(matches!(map_icon_to_payload("xyz"), Err(IconError::UnknownCategory { .. })));
}

#[test]
fn wrong_length_codes_are_rejected() {
    for code in ["", "1", "10", "10dd", "10 n", "01d\n"] {
        assert!(matches!(map_icon_to_payload(code), Err(IconError::InvalidLength { .. })), "{code:?}");
    }
}

#[test]
fn display_icon_wraps_payload() {
    for payload in [SUNNY, CLOUDY, RAINY] {
        assert_eq!(encode_display_icon(payload).unwrap(), format!("01{payload}00"));
    }
    for bad in ["", "08221C551C22080", "08221C551C2208000"] {
        assert!(matches!(encode_display_icon(bad), Err(CommandError::PayloadLength { .. })));
    }
}

#[test]
fn encoders_are_deterministic() {
    assert_eq!(map_icon_to_payload("10n"), map_icon_to_payload("10n"));
    assert_eq!(encode_scroll_settings(25, 3), encode_scroll_settings(25, 3));
    assert_eq!(encode_brightness(9), encode_brightness(9));
    assert_eq!(encode_scroll_text("hi"), encode_scroll_text("hi"));
}
