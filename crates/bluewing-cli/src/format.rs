//! Output formatting for scan results and GATT trees.

use std::fmt::Write as _;

use anyhow::Result;
use serde::Serialize;

use bluewing_core::{Characteristic, Peripheral};
use bluewing_types::CharacteristicProperties;

/// One line of scan output, aggregated over all sightings of a peripheral.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ScanRow {
    pub id: String,
    pub name: Option<String>,
    pub rssi: Option<i16>,
    pub sightings: u32,
}

impl ScanRow {
    pub fn new(peripheral: &Peripheral) -> Self {
        Self {
            id: peripheral.id.to_string(),
            name: peripheral.name.clone(),
            rssi: peripheral.rssi,
            sightings: 1,
        }
    }

    /// Merge a later sighting of the same peripheral.
    pub fn update(&mut self, peripheral: &Peripheral) {
        if peripheral.name.is_some() {
            self.name.clone_from(&peripheral.name);
        }
        if peripheral.rssi.is_some() {
            self.rssi = peripheral.rssi;
        }
        self.sightings += 1;
    }
}

/// Sort rows strongest signal first, unknown RSSI last.
pub fn sort_rows(rows: &mut [ScanRow]) {
    rows.sort_by(|a, b| {
        b.rssi
            .unwrap_or(i16::MIN)
            .cmp(&a.rssi.unwrap_or(i16::MIN))
            .then_with(|| a.id.cmp(&b.id))
    });
}

#[must_use]
pub fn format_scan_text(rows: &[ScanRow]) -> String {
    if rows.is_empty() {
        return "No peripherals found.\n".to_string();
    }

    let id_width = rows.iter().map(|r| r.id.len()).max().unwrap_or(0).max(2);
    let mut out = String::new();
    let _ = writeln!(
        out,
        "{:<id_width$}  {:>5}  {:>5}  NAME",
        "ID", "RSSI", "SEEN"
    );
    for row in rows {
        let rssi = row
            .rssi
            .map_or_else(|| "-".to_string(), |r| r.to_string());
        let _ = writeln!(
            out,
            "{:<id_width$}  {:>5}  {:>5}  {}",
            row.id,
            rssi,
            row.sightings,
            row.name.as_deref().unwrap_or("(unknown)")
        );
    }
    let _ = writeln!(out, "\n{} peripheral(s) found", rows.len());
    out
}

pub fn format_scan_json(rows: &[ScanRow]) -> Result<String> {
    #[derive(Serialize)]
    struct ScanResult<'a> {
        count: usize,
        peripherals: &'a [ScanRow],
    }

    let json = serde_json::to_string_pretty(&ScanResult {
        count: rows.len(),
        peripherals: rows,
    })?;
    Ok(json + "\n")
}

/// Short names for the property bits set on a characteristic.
#[must_use]
pub fn property_names(properties: CharacteristicProperties) -> Vec<&'static str> {
    const NAMES: [(CharacteristicProperties, &str); 8] = [
        (CharacteristicProperties::BROADCAST, "broadcast"),
        (CharacteristicProperties::READ, "read"),
        (
            CharacteristicProperties::WRITE_WITHOUT_RESPONSE,
            "write-no-rsp",
        ),
        (CharacteristicProperties::WRITE, "write"),
        (CharacteristicProperties::NOTIFY, "notify"),
        (CharacteristicProperties::INDICATE, "indicate"),
        (
            CharacteristicProperties::AUTHENTICATED_SIGNED_WRITES,
            "signed-write",
        ),
        (CharacteristicProperties::EXTENDED_PROPERTIES, "extended"),
    ];
    NAMES
        .iter()
        .filter(|(flag, _)| properties.contains(*flag))
        .map(|(_, name)| *name)
        .collect()
}

/// Lowercase hex with a space between bytes.
#[must_use]
pub fn hex(bytes: &[u8]) -> String {
    let mut out = String::with_capacity(bytes.len() * 3);
    for (i, b) in bytes.iter().enumerate() {
        if i > 0 {
            out.push(' ');
        }
        let _ = write!(out, "{:02x}", b);
    }
    out
}

fn describe_value(characteristic: &Characteristic) -> Option<String> {
    let bytes = characteristic.value_bytes()?;
    let printable = characteristic
        .value_string()
        .filter(|s| !s.is_empty() && s.chars().all(|c| !c.is_control()));
    Some(match printable {
        Some(text) => format!("\"{}\" [{}]", text, hex(bytes)),
        None => format!("[{}]", hex(bytes)),
    })
}

#[must_use]
pub fn format_tree_text(peripheral: &Peripheral) -> String {
    let mut out = String::new();
    let _ = writeln!(
        out,
        "{} ({})",
        peripheral.id,
        peripheral.name.as_deref().unwrap_or("unknown")
    );
    if let Some(rssi) = peripheral.rssi {
        let _ = writeln!(out, "  RSSI: {} dBm", rssi);
    }
    if peripheral.services.is_empty() {
        let _ = writeln!(out, "  (no services)");
        return out;
    }
    for service in &peripheral.services {
        let kind = if service.primary { "" } else { " (secondary)" };
        let _ = writeln!(out, "  service {}{}", service.uuid, kind);
        for c in &service.characteristics {
            let _ = write!(
                out,
                "    {} [{:#06x}] {}",
                c.name(),
                c.handle,
                property_names(c.properties).join(",")
            );
            if let Some(value) = describe_value(c) {
                let _ = write!(out, " = {}", value);
            }
            out.push('\n');
        }
    }
    out
}

pub fn format_tree_json(peripheral: &Peripheral) -> Result<String> {
    Ok(serde_json::to_string_pretty(peripheral)? + "\n")
}

#[cfg(test)]
mod tests {
    use super::*;
    use bluewing_core::Service;
    use bluewing_types::{PeripheralId, uuids};

    fn sighting(id: &str, name: Option<&str>, rssi: Option<i16>) -> Peripheral {
        let mut p = Peripheral::new(PeripheralId::new(id));
        p.name = name.map(str::to_string);
        p.rssi = rssi;
        p
    }

    #[test]
    fn test_row_update_keeps_known_name() {
        let mut row = ScanRow::new(&sighting("aa", Some("Thermo"), Some(-70)));
        row.update(&sighting("aa", None, Some(-60)));
        assert_eq!(row.name.as_deref(), Some("Thermo"));
        assert_eq!(row.rssi, Some(-60));
        assert_eq!(row.sightings, 2);
    }

    #[test]
    fn test_sort_rows_by_signal() {
        let mut rows = vec![
            ScanRow::new(&sighting("aa", None, None)),
            ScanRow::new(&sighting("bb", None, Some(-80))),
            ScanRow::new(&sighting("cc", None, Some(-40))),
        ];
        sort_rows(&mut rows);
        let ids: Vec<_> = rows.iter().map(|r| r.id.as_str()).collect();
        assert_eq!(ids, vec!["CC", "BB", "AA"]);
    }

    #[test]
    fn test_scan_text() {
        assert_eq!(format_scan_text(&[]), "No peripherals found.\n");

        let rows = vec![ScanRow::new(&sighting("aa:bb", Some("Thermo"), Some(-58)))];
        let text = format_scan_text(&rows);
        assert!(text.contains("AA:BB"));
        assert!(text.contains("-58"));
        assert!(text.contains("Thermo"));
        assert!(text.contains("1 peripheral(s) found"));
    }

    #[test]
    fn test_scan_json() {
        let rows = vec![ScanRow::new(&sighting("aa", None, Some(-58)))];
        let json: serde_json::Value =
            serde_json::from_str(&format_scan_json(&rows).unwrap()).unwrap();
        assert_eq!(json["count"], 1);
        assert_eq!(json["peripherals"][0]["id"], "AA");
        assert_eq!(json["peripherals"][0]["rssi"], -58);
        assert!(json["peripherals"][0]["name"].is_null());
    }

    #[test]
    fn test_hex() {
        assert_eq!(hex(&[]), "");
        assert_eq!(hex(&[0x01, 0xab, 0x00]), "01 ab 00");
    }

    #[test]
    fn test_property_names() {
        let props = CharacteristicProperties::READ | CharacteristicProperties::NOTIFY;
        assert_eq!(property_names(props), vec!["read", "notify"]);
        assert!(property_names(CharacteristicProperties::empty()).is_empty());
    }

    #[test]
    fn test_tree_text() {
        let mut battery = Characteristic::new(
            uuids::BATTERY_LEVEL,
            7,
            CharacteristicProperties::READ | CharacteristicProperties::NOTIFY,
        );
        battery.value = Some(vec![0x57]);
        let mut model = Characteristic::new(uuids::MODEL_NUMBER, 3, CharacteristicProperties::READ);
        model.value = Some(b"TH-1".to_vec());

        let mut p = sighting("aa", Some("Thermo"), Some(-50));
        p.services = vec![
            Service::new(uuids::DEVICE_INFO_SERVICE).with_characteristic(model),
            Service::new(uuids::BATTERY_SERVICE).with_characteristic(battery),
        ];

        let text = format_tree_text(&p);
        assert!(text.starts_with("AA (Thermo)\n"));
        assert!(text.contains(&format!("service {}", uuids::BATTERY_SERVICE)));
        assert!(text.contains("[0x0007] read,notify = \"W\" [57]"));
        assert!(text.contains("\"TH-1\" [54 48 2d 31]"));
    }

    #[test]
    fn test_tree_text_without_services() {
        let text = format_tree_text(&sighting("aa", None, None));
        assert!(text.contains("(no services)"));
    }
}
