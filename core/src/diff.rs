//! Line diff used by reducer debugging and test failure messages.
//!
//! Unchanged lines are prefixed with a space, removed lines with `-` and
//! added lines with `+`.

/// One line of a diff
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Line<'a> {
    /// Present on both sides
    Same(&'a str),
    /// Only in the old text
    Removed(&'a str),
    /// Only in the new text
    Added(&'a str),
}

impl Line<'_> {
    const fn marker(&self) -> char {
        match self {
            Self::Same(_) => ' ',
            Self::Removed(_) => '-',
            Self::Added(_) => '+',
        }
    }

    const fn text(&self) -> &str {
        match self {
            Self::Same(text) | Self::Removed(text) | Self::Added(text) => *text,
        }
    }
}

/// Diff two texts line by line using their longest common subsequence.
#[must_use]
pub fn lines<'a>(old: &'a str, new: &'a str) -> Vec<Line<'a>> {
    let old: Vec<&str> = old.lines().collect();
    let new: Vec<&str> = new.lines().collect();
    let (n, m) = (old.len(), new.len());

    // common[i][j]: length of the LCS of old[i..] and new[j..]
    let mut common = vec![vec![0_usize; m + 1]; n + 1];
    for i in (0..n).rev() {
        for j in (0..m).rev() {
            common[i][j] = if old[i] == new[j] {
                common[i + 1][j + 1] + 1
            } else {
                common[i + 1][j].max(common[i][j + 1])
            };
        }
    }

    let mut out = Vec::with_capacity(n.max(m));
    let (mut i, mut j) = (0, 0);
    while i < n && j < m {
        if old[i] == new[j] {
            out.push(Line::Same(old[i]));
            i += 1;
            j += 1;
        } else if common[i + 1][j] >= common[i][j + 1] {
            out.push(Line::Removed(old[i]));
            i += 1;
        } else {
            out.push(Line::Added(new[j]));
            j += 1;
        }
    }
    out.extend(old[i..].iter().map(|line| Line::Removed(line)));
    out.extend(new[j..].iter().map(|line| Line::Added(line)));
    out
}

/// Render a diff of `old` against `new`, one `"{marker} {line}"` per line.
///
/// ```
/// use composable_arch_core::diff;
///
/// let rendered = diff::render("a\nb\nc", "a\nB\nc");
/// assert_eq!(rendered, "  a\n- b\n+ B\n  c");
/// ```
#[must_use]
pub fn render(old: &str, new: &str) -> String {
    lines(old, new)
        .iter()
        .map(|line| format!("{} {}", line.marker(), line.text()))
        .collect::<Vec<_>>()
        .join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_identical_texts_have_no_changes() {
        let diff = lines("x\ny", "x\ny");
        assert!(diff.iter().all(|line| matches!(line, Line::Same(_))));
    }

    #[test]
    fn test_changed_field_in_pretty_debug() {
        let old = "State {\n    count: 1,\n    name: \"a\",\n}";
        let new = "State {\n    count: 2,\n    name: \"a\",\n}";

        assert_eq!(
            render(old, new),
            "  State {\n-     count: 1,\n+     count: 2,\n      name: \"a\",\n  }"
        );
    }

    #[test]
    fn test_appended_and_removed_lines() {
        assert_eq!(render("a", "a\nb"), "  a\n+ b");
        assert_eq!(render("a\nb", "b"), "- a\n  b");
        assert_eq!(render("", "a"), "+ a");
    }
}
