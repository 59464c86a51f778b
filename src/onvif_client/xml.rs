//! Namespace-agnostic XML extraction
//!
//! ONVIF responses prefix the same schema with whatever namespace alias the
//! firmware prefers (tt:, tds:, trt:, tptz:, or none). Matching is done on
//! the local tag name so the parsers survive all of them.

/// Extract the text content of the first occurrence of `tag`.
pub fn extract_xml_value(xml: &str, tag: &str) -> Option<String> {
    let (start, _) = find_open_tag(xml, tag)?;
    // self-closing tags carry no text
    let open_end = xml[start..].find('>')? + start;
    if xml[..open_end].ends_with('/') {
        return None;
    }
    let close = find_close_tag(xml, open_end + 1, tag)?;
    let value = xml[open_end + 1..close].trim().to_string();
    if value.is_empty() {
        None
    } else {
        Some(value)
    }
}

/// Extract an attribute value from the first occurrence of `tag`.
pub fn extract_xml_attribute(xml: &str, tag: &str, attr: &str) -> Option<String> {
    let (start, _) = find_open_tag(xml, tag)?;
    let open_end = xml[start..].find('>')? + start;
    let tag_content = &xml[start..open_end];
    let attr_pattern = format!("{}=", attr);
    let attr_start = tag_content.find(&attr_pattern)?;
    let after_attr = &tag_content[attr_start + attr_pattern.len()..];
    let quote = if after_attr.starts_with('\'') { '\'' } else { '"' };
    let val_start = after_attr.find(quote)?;
    let val_content = &after_attr[val_start + 1..];
    let val_end = val_content.find(quote)?;
    Some(val_content[..val_end].to_string())
}

/// Collect every `<ns:tag ...>...</ns:tag>` section body, outermost match first.
///
/// Sections include the opening tag (so attribute extraction keeps working)
/// but not the closing tag. Assumes the tag does not nest within itself,
/// which holds for the ONVIF structures consumed here.
pub fn extract_xml_sections<'a>(xml: &'a str, tag: &str) -> Vec<&'a str> {
    let mut sections = Vec::new();
    let mut cursor = 0usize;
    while cursor < xml.len() {
        let Some((start, _)) = find_open_tag(&xml[cursor..], tag) else {
            break;
        };
        let abs_start = cursor + start;
        let Some(open_end) = xml[abs_start..].find('>').map(|i| abs_start + i) else {
            break;
        };
        if xml[..open_end].ends_with('/') {
            // self-closing: the section is the tag itself
            sections.push(&xml[abs_start..open_end + 1]);
            cursor = open_end + 1;
            continue;
        }
        match find_close_tag(xml, open_end + 1, tag) {
            Some(close) => {
                sections.push(&xml[abs_start..close]);
                cursor = close + 2;
            }
            None => break,
        }
    }
    sections
}

/// Extract the first section body for `tag`, if any.
pub fn extract_xml_section<'a>(xml: &'a str, tag: &str) -> Option<&'a str> {
    extract_xml_sections(xml, tag).into_iter().next()
}

/// True when `tag` occurs at all (presence checks for capability spaces).
pub fn xml_tag_present(xml: &str, tag: &str) -> bool {
    find_open_tag(xml, tag).is_some()
}

/// Parse an xs:duration like "PT5S" / "PT1M30S" / "PT0.3S" into seconds.
pub fn parse_iso_duration_sec(raw: &str) -> Option<f64> {
    let rest = raw.trim().strip_prefix("PT")?;
    let mut seconds = 0.0f64;
    let mut number = String::new();
    for c in rest.chars() {
        match c {
            '0'..='9' | '.' => number.push(c),
            'H' | 'h' => {
                seconds += number.parse::<f64>().ok()? * 3600.0;
                number.clear();
            }
            'M' | 'm' => {
                seconds += number.parse::<f64>().ok()? * 60.0;
                number.clear();
            }
            'S' | 's' => {
                seconds += number.parse::<f64>().ok()?;
                number.clear();
            }
            _ => return None,
        }
    }
    if !number.is_empty() {
        return None;
    }
    Some(seconds)
}

/// Find the first opening tag whose local name equals `tag`.
/// Returns (index of '<', index just past the matched name).
fn find_open_tag(xml: &str, tag: &str) -> Option<(usize, usize)> {
    let mut idx = 0usize;
    while let Some(rel) = xml[idx..].find('<') {
        let start = idx + rel;
        let after = &xml[start + 1..];
        if after.starts_with('/') || after.starts_with('?') || after.starts_with('!') {
            idx = start + 1;
            continue;
        }
        let name_end = after
            .find(|c: char| c == '>' || c == ' ' || c == '/' || c == '\n' || c == '\t')
            .unwrap_or(after.len());
        let name = &after[..name_end];
        let local = name.rsplit(':').next().unwrap_or(name);
        if local == tag {
            return Some((start, start + 1 + name_end));
        }
        idx = start + 1;
    }
    None
}

/// Find the matching `</ns:tag>` at or after `from`. Returns the index of '<'.
fn find_close_tag(xml: &str, from: usize, tag: &str) -> Option<usize> {
    let mut idx = from;
    while let Some(rel) = xml[idx..].find("</") {
        let start = idx + rel;
        let gt = xml[start..].find('>')? + start;
        let name = &xml[start + 2..gt];
        let local = name.rsplit(':').next().unwrap_or(name);
        if local.trim() == tag {
            return Some(start);
        }
        idx = gt + 1;
    }
    None
}
