//! Parses the fixed-width tables printed by `diskpart` and `wmic`.
//!
//! Neither tool separates its columns with a delimiter; values line up under
//! the header words instead. A column therefore starts at the character offset
//! of its header word and ends where the next header word starts:
//!
//! ```text
//!   Disk ###  Status         Size     Free     Dyn  Gpt
//!   --------  -------------  -------  -------  ---  ---
//!   Disk 0    Online         1863 GB  1024 KB        *
//! ```

/// Where the table sits inside a block of tool output.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct TableLayout<'a> {
    /// The header row is the first line whose trimmed text starts with this word.
    pub anchor: &'a str,
    /// Lines skipped between the header and the first data row.
    pub skip_after_header: usize,
    /// Lines dropped from the end of the output before rows are read.
    pub trailing: usize,
}

impl<'a> TableLayout<'a> {
    /// The layout of a `diskpart` listing: a dashed separator under the header
    /// and two terminator lines at the end.
    pub const fn new(anchor: &'a str) -> Self {
        Self {
            anchor,
            skip_after_header: 1,
            trailing: 2,
        }
    }

    pub const fn skip_after_header(mut self, lines: usize) -> Self {
        self.skip_after_header = lines;
        self
    }

    pub const fn trailing(mut self, lines: usize) -> Self {
        self.trailing = lines;
        self
    }
}

/// One data row, keyed by header word, in header order.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Record {
    fields: Vec<(String, String)>,
}

impl Record {
    pub fn get(&self, key: &str) -> Option<&str> {
        self.fields
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    /// The value under `key`, or an empty string when the column is absent.
    pub fn value(&self, key: &str) -> &str {
        self.get(key).unwrap_or("")
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.fields.iter().map(|(k, _)| k.as_str())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.fields.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }
}

impl FromIterator<(String, String)> for Record {
    fn from_iter<I: IntoIterator<Item = (String, String)>>(iter: I) -> Self {
        Self {
            fields: iter.into_iter().collect(),
        }
    }
}

/// Start offsets (in characters) of every whitespace-delimited word of `line`.
fn word_offsets(line: &str) -> Vec<(usize, String)> {
    let mut words = Vec::new();
    let mut current: Option<(usize, String)> = None;

    for (offset, c) in line.chars().enumerate() {
        if c.is_whitespace() {
            if let Some(word) = current.take() {
                words.push(word);
            }
        } else {
            current
                .get_or_insert_with(|| (offset, String::new()))
                .1
                .push(c);
        }
    }
    words.extend(current);
    words
}

/// Converts a fixed-width table in `text` into one [`Record`] per data row.
///
/// Returns an empty list when no line starts with the layout's anchor. Rows
/// shorter than the header produce empty values for the missing columns.
pub fn parse(text: &str, layout: TableLayout<'_>) -> Vec<Record> {
    let lines: Vec<&str> = text.lines().collect();
    let end = lines.len().saturating_sub(layout.trailing);

    let Some(start) = lines[..end]
        .iter()
        .position(|line| line.trim().starts_with(layout.anchor))
    else {
        return Vec::new();
    };

    let columns = word_offsets(lines[start].trim());
    let first_row = (start + 1 + layout.skip_after_header).min(end);

    lines[first_row..end]
        .iter()
        .map(|line| line.trim())
        .filter(|line| !line.is_empty())
        .map(|line| {
            let chars: Vec<char> = line.chars().collect();
            columns
                .iter()
                .enumerate()
                .map(|(i, (offset, name))| {
                    let stop = columns
                        .get(i + 1)
                        .map_or(chars.len(), |(next, _)| *next)
                        .min(chars.len());
                    let value: String = chars
                        .get(*offset..stop)
                        .map(|slice| slice.iter().collect())
                        .unwrap_or_default();
                    (name.clone(), value.trim().to_string())
                })
                .collect()
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    const LIST_DISK: &str = "\
Microsoft DiskPart version 10.0.19041.964

Copyright (C) Microsoft Corporation.
On computer: NODE

  Disk ###  Status         Size     Free     Dyn  Gpt
  --------  -------------  -------  -------  ---  ---
  Disk 0    Online         1863 GB  1024 KB        *
  Disk 1    No Media           0 B      0 B
  Disk 2    Online           59 GB  1024 KB

Leaving DiskPart...
";

    #[test]
    fn parses_minimal_disk_listing() {
        let text = "Disk ###  Status   Size\n--------  -------  ----\nDisk 0    Online   16 GB\n\n\n";
        let rows = parse(text, TableLayout::new("Disk"));

        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].value("###"), "0");
        assert_eq!(rows[0].value("Status"), "Online");
        assert_eq!(rows[0].value("Size"), "16 GB");
    }

    #[test]
    fn skips_banner_and_terminator_lines() {
        let rows = parse(LIST_DISK, TableLayout::new("Disk"));

        assert_eq!(rows.len(), 3);
        assert_eq!(
            rows[0].keys().collect::<Vec<_>>(),
            ["Disk", "###", "Status", "Size", "Free", "Dyn", "Gpt"]
        );
        assert_eq!(rows[0].value("Size"), "1863 GB");
        assert_eq!(rows[0].value("Gpt"), "*");
        assert_eq!(rows[1].value("Status"), "No Media");
        assert_eq!(rows[2].value("###"), "2");
        assert_eq!(rows[2].value("Free"), "1024 KB");
    }

    #[test]
    fn values_follow_header_offsets() {
        let header = "Alpha  Be  Gamma";
        let row = "a1     b2  g3 and more";
        let text = format!("{header}\n-----\n{row}\n\n\n");
        let rows = parse(&text, TableLayout::new("Alpha"));

        let offsets = [0, 7, 11];
        let expected = [
            row[offsets[0]..offsets[1]].trim(),
            row[offsets[1]..offsets[2]].trim(),
            row[offsets[2]..].trim(),
        ];
        assert_eq!(rows[0].value("Alpha"), expected[0]);
        assert_eq!(rows[0].value("Be"), expected[1]);
        assert_eq!(rows[0].value("Gamma"), expected[2]);
    }

    #[test]
    fn short_rows_yield_empty_values() {
        let text = "Disk ###  Status         Size     Free     Dyn  Gpt\n---\nDisk 1    No Media\n\n\n";
        let rows = parse(text, TableLayout::new("Disk"));

        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].value("Status"), "No Media");
        assert_eq!(rows[0].get("Size"), Some(""));
        assert_eq!(rows[0].get("Gpt"), Some(""));
    }

    #[test]
    fn missing_anchor_yields_no_rows() {
        let text = "There are no partitions on this disk to show.\n\n\n";
        assert!(parse(text, TableLayout::new("Partition")).is_empty());
    }

    #[test]
    fn header_without_separator() {
        let text = "Index  MediaType\n1      Removable Media\n\n";
        let rows = parse(
            text,
            TableLayout::new("Index").skip_after_header(0).trailing(0),
        );

        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].value("MediaType"), "Removable Media");
    }

    #[test]
    fn anchor_must_start_the_line() {
        // "DiskPart" in the banner contains the anchor word but does not start the line.
        let rows = parse(LIST_DISK, TableLayout::new("Disk"));
        assert_eq!(rows[0].value("Disk"), "Disk");
    }
}
