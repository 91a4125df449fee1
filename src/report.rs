//! Parsers for the text reports DISM prints with `/English`.
//!
//! Every key DISM emits that we understand is listed in `IMAGE_KEYS` or
//! `FEATURE_KEYS`; anything else is ignored.

use std::collections::HashMap;

use chrono::{NaiveDate, NaiveDateTime};
use once_cell::sync::Lazy;
use tracing::debug;

use crate::error::{AppError, Result};
use crate::models::{
    FeatureDetail, FeatureState, FeatureSummary, ImageRecord, PropertyTree, WimImageInfo,
};

pub const OPERATION_SUCCESS: &str = "The operation completed successfully.";
pub const RESTORE_SUCCESS: &str = "The restore operation completed successfully.";
pub const NO_CORRUPTION: &str = "No component store corruption detected.";

const LANGUAGES_MARKER: &str = "Languages :";
const DEFAULT_SUFFIX: &str = "(Default)";
const CUSTOM_PROPERTIES_MARKER: &str = "Custom Properties:";

/// Banner lines printed before the first feature in `/Get-Features`.
const FEATURE_LIST_HEADER_LINES: usize = 8;
/// Name, state, blank separator.
const FEATURE_LIST_GROUP: usize = 3;
/// Banner lines printed before `Feature Name` in `/Get-FeatureInfo`.
const FEATURE_INFO_HEADER_LINES: usize = 8;
const FEATURE_INFO_FIELDS: usize = 5;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ImageKey {
    Index,
    Name,
    Description,
    Size,
    Bootable,
    Architecture,
    Hal,
    Version,
    ServicePackBuild,
    ServicePackLevel,
    Edition,
    Installation,
    ProductType,
    ProductSuite,
    SystemRoot,
    Directories,
    Files,
    Created,
    Modified,
}

static IMAGE_KEYS: Lazy<HashMap<&'static str, ImageKey>> = Lazy::new(|| {
    HashMap::from([
        ("Index", ImageKey::Index),
        ("Name", ImageKey::Name),
        ("Description", ImageKey::Description),
        ("Size", ImageKey::Size),
        ("WIM Bootable", ImageKey::Bootable),
        ("Architecture", ImageKey::Architecture),
        ("Hal", ImageKey::Hal),
        ("Version", ImageKey::Version),
        ("ServicePack Build", ImageKey::ServicePackBuild),
        ("ServicePack Level", ImageKey::ServicePackLevel),
        ("Edition", ImageKey::Edition),
        ("Installation", ImageKey::Installation),
        ("ProductType", ImageKey::ProductType),
        ("ProductSuite", ImageKey::ProductSuite),
        ("System Root", ImageKey::SystemRoot),
        ("Directories", ImageKey::Directories),
        ("Files", ImageKey::Files),
        ("Created", ImageKey::Created),
        ("Modified", ImageKey::Modified),
    ])
});

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum FeatureKey {
    Name,
    DisplayName,
    Description,
    RestartRequired,
    State,
}

static FEATURE_KEYS: Lazy<HashMap<&'static str, FeatureKey>> = Lazy::new(|| {
    HashMap::from([
        ("Feature Name", FeatureKey::Name),
        ("Display Name", FeatureKey::DisplayName),
        ("Description", FeatureKey::Description),
        ("Restart Required", FeatureKey::RestartRequired),
        ("State", FeatureKey::State),
    ])
});

/// Split a `Key : Value` line. A trailing ` :` yields an empty value.
fn split_entry(line: &str) -> Option<(&str, &str)> {
    let line = line.trim();
    if let Some((key, value)) = line.split_once(" : ") {
        return Some((key.trim(), value.trim()));
    }
    line.strip_suffix(" :").map(|key| (key.trim(), ""))
}

/// The value part of a `Key : Value` line, or the whole trimmed line.
fn line_value(line: &str) -> &str {
    split_entry(line).map_or_else(|| line.trim(), |(_, value)| value)
}

/// Parse a size such as `15,244,076,567 bytes` or `1ÿ234 bytes`.
pub fn parse_size(value: &str) -> Option<u64> {
    let value = value.trim();
    let value = value.strip_suffix("bytes").unwrap_or(value);
    let digits: String = value.chars().filter(char::is_ascii_digit).collect();
    if digits.is_empty() {
        return None;
    }
    digits.parse().ok()
}

/// Parse a `D/M/YYYY - H:M:S` timestamp.
pub fn parse_timestamp(value: &str) -> Result<NaiveDateTime> {
    let invalid = |reason: &str| AppError::Timestamp {
        value: value.to_string(),
        reason: reason.to_string(),
    };

    let halves: Vec<&str> = value.split('-').map(str::trim).collect();
    let [date, time] = halves.as_slice() else {
        return Err(invalid("expected `date - time`"));
    };
    let date = numeric_segments(date, '/').ok_or_else(|| invalid("date is not numeric"))?;
    let time = numeric_segments(time, ':').ok_or_else(|| invalid("time is not numeric"))?;
    let [day, month, year] = date.as_slice() else {
        return Err(invalid("date must have day, month and year"));
    };
    let [hour, minute, second] = time.as_slice() else {
        return Err(invalid("time must have hour, minute and second"));
    };

    let year = i32::try_from(*year).map_err(|_| invalid("year out of range"))?;
    NaiveDate::from_ymd_opt(year, *month, *day)
        .and_then(|d| d.and_hms_opt(*hour, *minute, *second))
        .ok_or_else(|| invalid("no such calendar date or time"))
}

fn numeric_segments(value: &str, sep: char) -> Option<Vec<u32>> {
    value
        .split(sep)
        .map(|s| s.trim().parse::<u32>().ok())
        .collect()
}

/// Parse the report of `/Get-WimInfo /WimFile:<file> /Index:<index>`.
pub fn parse_image_info(text: &str, requested_index: u32) -> Result<ImageRecord> {
    let mut record = ImageRecord {
        index: requested_index,
        ..Default::default()
    };

    let lines: Vec<&str> = text.lines().collect();
    let marker = lines.iter().position(|l| l.contains(LANGUAGES_MARKER));
    let fields = &lines[..marker.unwrap_or(lines.len())];

    for line in fields {
        let Some((key, value)) = split_entry(line) else {
            continue;
        };
        let Some(field) = IMAGE_KEYS.get(key) else {
            debug!("ignoring image report key {key:?}");
            continue;
        };
        let owned = || Some(value.to_string());
        match field {
            ImageKey::Index => {
                if let Ok(index) = value.parse() {
                    record.index = index;
                }
            }
            ImageKey::Name => record.name = owned(),
            ImageKey::Description => record.description = owned(),
            ImageKey::Size => record.size = parse_size(value),
            ImageKey::Bootable => record.bootable = Some(value == "Yes"),
            ImageKey::Architecture => record.architecture = owned(),
            ImageKey::Hal => record.hal = owned(),
            ImageKey::Version => record.version = owned(),
            ImageKey::ServicePackBuild => record.service_pack_build = value.parse().ok(),
            ImageKey::ServicePackLevel => record.service_pack_level = value.parse().ok(),
            ImageKey::Edition => record.edition = owned(),
            ImageKey::Installation => record.installation = owned(),
            ImageKey::ProductType => record.product_type = owned(),
            ImageKey::ProductSuite => record.product_suite = owned(),
            ImageKey::SystemRoot => record.system_root = owned(),
            ImageKey::Directories => record.directories = value.parse().ok(),
            ImageKey::Files => record.files = value.parse().ok(),
            ImageKey::Created => record.created = Some(parse_timestamp(value)?),
            ImageKey::Modified => record.modified = Some(parse_timestamp(value)?),
        }
    }

    if let Some(marker) = marker {
        let (languages, default) = parse_languages(&lines[marker + 1..]);
        record.languages = languages;
        record.default_language = default;
    }
    Ok(record)
}

/// Collect the language tags listed after the `Languages :` line.
pub fn parse_languages(lines: &[&str]) -> (Vec<String>, Option<String>) {
    let mut languages = Vec::new();
    let mut default = None;
    for line in lines {
        let trimmed = line.trim();
        if trimmed.is_empty() || trimmed == OPERATION_SUCCESS {
            continue;
        }
        let mut tag: String = trimmed.chars().filter(|c| *c != ' ' && *c != '\t').collect();
        if let Some(stripped) = tag.strip_suffix(DEFAULT_SUFFIX) {
            tag = stripped.to_string();
            default = Some(tag.clone());
        }
        languages.push(tag);
    }
    (languages, default)
}

/// Parse a plain `/Get-WimInfo` listing of every image in a file.
pub fn parse_wim_listing(text: &str) -> Vec<WimImageInfo> {
    let mut result = Vec::new();
    let mut current: Option<WimImageInfo> = None;
    for line in text.lines() {
        let Some((key, value)) = split_entry(line) else {
            continue;
        };
        match IMAGE_KEYS.get(key) {
            Some(ImageKey::Index) => {
                if let Some(info) = current.take() {
                    result.push(info);
                }
                if let Ok(index) = value.parse::<u32>() {
                    current = Some(WimImageInfo {
                        index,
                        name: String::new(),
                        description: None,
                        size: None,
                    });
                }
            }
            Some(field) => {
                if let Some(info) = current.as_mut() {
                    match field {
                        ImageKey::Name => info.name = value.to_string(),
                        ImageKey::Description => info.description = Some(value.to_string()),
                        ImageKey::Size => info.size = parse_size(value),
                        _ => {}
                    }
                }
            }
            None => {}
        }
    }
    if let Some(info) = current {
        result.push(info);
    }
    result
}

/// Parse `/Get-Features` output into name/state pairs.
pub fn parse_feature_list(text: &str) -> Vec<FeatureSummary> {
    let lines: Vec<&str> = text.lines().skip(FEATURE_LIST_HEADER_LINES).collect();
    lines
        .chunks_exact(FEATURE_LIST_GROUP)
        .map(|group| FeatureSummary {
            name: line_value(group[0]).to_string(),
            state: FeatureState::from_report(line_value(group[1])),
        })
        .collect()
}

/// Parse `/Get-FeatureInfo` output.
pub fn parse_feature_info(text: &str) -> Result<FeatureDetail> {
    let lines: Vec<&str> = text.lines().collect();
    let mut detail = FeatureDetail::default();

    let header = lines
        .iter()
        .skip(FEATURE_INFO_HEADER_LINES)
        .take(FEATURE_INFO_FIELDS);
    for line in header {
        let Some((key, value)) = split_entry(line) else {
            continue;
        };
        let Some(field) = FEATURE_KEYS.get(key) else {
            debug!("ignoring feature report key {key:?}");
            continue;
        };
        match field {
            FeatureKey::Name => detail.name = Some(value.to_string()),
            FeatureKey::DisplayName => detail.display_name = Some(value.to_string()),
            FeatureKey::Description => detail.description = Some(value.to_string()),
            FeatureKey::RestartRequired => detail.restart_required = value != "No",
            FeatureKey::State => detail.state = Some(value.to_string()),
        }
    }

    if let Some(marker) = lines
        .iter()
        .position(|l| l.trim() == CUSTOM_PROPERTIES_MARKER)
    {
        detail.custom_properties = parse_custom_properties(&lines[marker + 1..])?;
    }
    Ok(detail)
}

fn parse_custom_properties(lines: &[&str]) -> Result<PropertyTree> {
    let mut tree = PropertyTree::default();
    for line in lines {
        let trimmed = line.trim();
        if trimmed.is_empty() {
            continue;
        }
        let Some((path, value)) = trimmed.split_once(':') else {
            continue;
        };
        tree.insert(path.trim(), value.trim())?;
    }
    Ok(tree)
}

#[cfg(test)]
mod tests {
    use chrono::{Datelike, Timelike};
    use indoc::indoc;

    use super::*;
    use crate::models::PropertyNode;

    const IMAGE_REPORT: &str = indoc! {"

        Deployment Image Servicing and Management tool
        Version: 10.0.19041.844

        Details for image : D:\\sources\\install.wim

        Index : 6
        Name : Windows 10 Pro
        Description : Windows 10 Pro
        Size : 15,244,076,567 bytes
        WIM Bootable : No
        Architecture : x64
        Hal : <undefined>
        Version : 10.0.19041
        ServicePack Build : 1
        ServicePack Level : 0
        Edition : Professional
        Installation : Client
        ProductType : WinNT
        ProductSuite : Terminal Server
        System Root : WINDOWS
        Directories : 19668
        Files : 101896
        Created : 07/12/2019 - 06:52:49
        Modified : 21/01/2020 - 17:07:26
        Languages :
                en-US (Default)
                fr-FR

        The operation completed successfully.
    "};

    #[test]
    fn full_image_report() {
        let record = parse_image_info(IMAGE_REPORT, 1).unwrap();
        assert_eq!(record.index, 6);
        assert_eq!(record.name.as_deref(), Some("Windows 10 Pro"));
        assert_eq!(record.size, Some(15_244_076_567));
        assert_eq!(record.bootable, Some(false));
        assert_eq!(record.hal.as_deref(), Some("<undefined>"));
        assert_eq!(record.version.as_deref(), Some("10.0.19041"));
        assert_eq!(record.service_pack_build, Some(1));
        assert_eq!(record.service_pack_level, Some(0));
        assert_eq!(record.system_root.as_deref(), Some("WINDOWS"));
        assert_eq!(record.directories, Some(19668));
        assert_eq!(record.files, Some(101_896));

        let created = record.created.unwrap();
        assert_eq!((created.day(), created.month(), created.year()), (7, 12, 2019));
        let modified = record.modified.unwrap();
        assert_eq!((modified.day(), modified.month()), (21, 1));
        assert_eq!(modified.hour(), 17);

        assert_eq!(record.languages, vec!["en-US", "fr-FR"]);
        assert_eq!(record.default_language.as_deref(), Some("en-US"));
    }

    #[test]
    fn size_strips_unit_and_glyphs() {
        let record = parse_image_info("Size : 1ÿ234 bytes", 1).unwrap();
        assert_eq!(record.size, Some(1234));
        assert_eq!(parse_size("4\u{a0}096 bytes"), Some(4096));
        assert_eq!(parse_size("unknown"), None);
    }

    #[test]
    fn timestamp_is_day_first() {
        let ts = parse_timestamp("05/03/2024 - 14:30:00").unwrap();
        let expected = NaiveDate::from_ymd_opt(2024, 3, 5)
            .unwrap()
            .and_hms_opt(14, 30, 0)
            .unwrap();
        assert_eq!(ts, expected);
    }

    #[test]
    fn malformed_timestamps() {
        for bad in [
            "05/03 - 14:30:00",
            "05/03/2024 - 14:30",
            "05/03/2024 14:30:00",
            "aa/03/2024 - 14:30:00",
            "31/02/2024 - 10:00:00",
        ] {
            let err = parse_timestamp(bad).unwrap_err();
            assert!(matches!(err, AppError::Timestamp { .. }), "{bad}");
        }
        let err = parse_image_info("Created : 05/03/2024", 1).unwrap_err();
        assert!(matches!(err, AppError::Timestamp { .. }));
    }

    #[test]
    fn absent_fields_stay_unset() {
        let record = parse_image_info("Index : 2\nFoo Bar : baz\nFiles : many\n", 9).unwrap();
        assert_eq!(record.index, 2);
        assert_eq!(record.files, None);
        assert_eq!(record.name, None);
        assert_eq!(record.bootable, None);
        assert!(record.languages.is_empty());
        assert_eq!(record.default_language, None);

        let record = parse_image_info("", 9).unwrap();
        assert_eq!(record.index, 9);
    }

    #[test]
    fn languages_block() {
        let lines = [
            "Languages :",
            "\ten-US(Default)",
            "  fr-FR",
            "   ",
            "The operation completed successfully.",
        ];
        let (languages, default) = parse_languages(&lines[1..]);
        assert_eq!(languages, vec!["en-US", "fr-FR"]);
        assert_eq!(default.as_deref(), Some("en-US"));

        let record = parse_image_info(&lines.join("\r\n"), 1).unwrap();
        assert_eq!(record.languages, vec!["en-US", "fr-FR"]);
        assert_eq!(record.default_language.as_deref(), Some("en-US"));
    }

    #[test]
    fn languages_without_default() {
        let (languages, default) = parse_languages(&["de-DE", "it-IT"]);
        assert_eq!(languages, vec!["de-DE", "it-IT"]);
        assert_eq!(default, None);
    }

    #[test]
    fn wim_listing() {
        let text = indoc! {"
            Deployment Image Servicing and Management tool
            Version: 10.0.19041.844

            Details for image : D:\\sources\\install.wim

            Index : 1
            Name : Windows 10 Home
            Description : Windows 10 Home
            Size : 14ÿ854ÿ613ÿ186 bytes

            Index : 2
            Name : Windows 10 Education
            Size : 15,105,157,475 bytes

            The operation completed successfully.
        "};
        let images = parse_wim_listing(text);
        assert_eq!(images.len(), 2);
        assert_eq!(images[0].index, 1);
        assert_eq!(images[0].name, "Windows 10 Home");
        assert_eq!(images[0].size, Some(14_854_613_186));
        assert_eq!(images[1].name, "Windows 10 Education");
        assert_eq!(images[1].description, None);
    }

    #[test]
    fn feature_list_groups_of_three() {
        let text = indoc! {"

            Deployment Image Servicing and Management tool
            Version: 10.0.19041.844

            Image Version: 10.0.19045.3803

            Features listing for package : Microsoft-Windows-Foundation-Package~31bf3856ad364e35~amd64~~10.0.19041.1

            Feature Name : Printing-PrintToPDFServices-Features
            State : Enabled

            Feature Name : TelnetClient
            State : Disabled

            Feature Name : Microsoft-Hyper-V-All
            State : Enable Pending

            The operation completed successfully.
        "};
        let features = parse_feature_list(text);
        assert_eq!(
            features,
            vec![
                FeatureSummary {
                    name: "Printing-PrintToPDFServices-Features".into(),
                    state: FeatureState::Enabled,
                },
                FeatureSummary {
                    name: "TelnetClient".into(),
                    state: FeatureState::Disabled,
                },
                FeatureSummary {
                    name: "Microsoft-Hyper-V-All".into(),
                    state: FeatureState::Enabled,
                },
            ]
        );
    }

    #[test]
    fn feature_list_ignores_separator_line() {
        let banner = "b\n".repeat(FEATURE_LIST_HEADER_LINES);
        let text = format!("{banner}A\nEnabled\nignored : x\nB\nDisabled\n\nC\nEnabled\n--\nD\n");
        let names: Vec<_> = parse_feature_list(&text)
            .into_iter()
            .map(|f| (f.name, f.state))
            .collect();
        assert_eq!(
            names,
            vec![
                ("A".to_string(), FeatureState::Enabled),
                ("B".to_string(), FeatureState::Disabled),
                ("C".to_string(), FeatureState::Enabled),
            ]
        );
        assert!(parse_feature_list("too\nshort\n").is_empty());
    }

    const FEATURE_INFO: &str = indoc! {"

        Deployment Image Servicing and Management tool
        Version: 10.0.19041.844

        Image Version: 10.0.19045.3803

        Feature Information:

        Feature Name : TelnetClient
        Display Name : Telnet Client
        Description : Allows you to connect to other computers remotely.
        Restart Required : Possible
        State : Disabled

        Custom Properties:

        ServerComponent\\Description : Telnet Client
        ServerComponent\\Id : 44
        ServerComponent\\Deploys\\Update\\Name : TelnetClient

        The operation completed successfully.
    "};

    #[test]
    fn feature_info() {
        let detail = parse_feature_info(FEATURE_INFO).unwrap();
        assert_eq!(detail.name.as_deref(), Some("TelnetClient"));
        assert_eq!(detail.display_name.as_deref(), Some("Telnet Client"));
        assert_eq!(
            detail.description.as_deref(),
            Some("Allows you to connect to other computers remotely.")
        );
        assert!(detail.restart_required);
        assert_eq!(detail.state.as_deref(), Some("Disabled"));

        let props = &detail.custom_properties;
        assert_eq!(props.value("ServerComponent\\Id"), Some("44"));
        assert_eq!(
            props.value("ServerComponent\\Deploys\\Update\\Name"),
            Some("TelnetClient")
        );
        assert!(matches!(
            props.get("ServerComponent"),
            Some(PropertyNode::Branch(_))
        ));
    }

    #[test]
    fn feature_info_without_properties() {
        let text = FEATURE_INFO
            .replace("Restart Required : Possible", "Restart Required : No")
            .replace(
                "ServerComponent\\Description : Telnet Client\nServerComponent\\Id : 44\nServerComponent\\Deploys\\Update\\Name : TelnetClient\n",
                "(No custom properties found)\n",
            );
        let detail = parse_feature_info(&text).unwrap();
        assert!(!detail.restart_required);
        assert!(detail.custom_properties.is_empty());
    }

    #[test]
    fn custom_properties_merge() {
        let tree = parse_custom_properties(&["foo\\bar : 1", "", "foo\\baz : 2"]).unwrap();
        assert_eq!(tree.value("foo\\bar"), Some("1"));
        assert_eq!(tree.value("foo\\baz"), Some("2"));
    }

    #[test]
    fn custom_properties_conflict() {
        let err = parse_custom_properties(&["a\\b : 1", "a\\b\\c : 2"]).unwrap_err();
        assert!(matches!(err, AppError::PropertyConflict { .. }));
    }
}
