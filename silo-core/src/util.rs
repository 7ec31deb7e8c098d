pub fn separated_by<T, F>(
    out: &mut String,
    values: impl IntoIterator<Item = T>,
    mut f: F,
    separator: &str,
) where
    F: FnMut(&mut String, T),
{
    let mut len = out.len();
    for v in values {
        if out.len() > len {
            out.push_str(separator);
        }
        len = out.len();
        f(out, v);
    }
}

/// Byte offset of the first case-insensitive (ASCII) occurrence of `needle`.
pub fn index_no_case(haystack: &str, needle: &str) -> Option<usize> {
    if needle.is_empty() {
        return Some(0);
    }
    let needle = needle.as_bytes();
    haystack
        .as_bytes()
        .windows(needle.len())
        .position(|w| w.eq_ignore_ascii_case(needle))
}

/// Splits `value` around at most `n - 1` case-insensitive occurrences of `separator`.
pub fn split_n_no_case<'s>(value: &'s str, separator: &str, n: usize) -> Vec<&'s str> {
    let mut result = Vec::new();
    let mut rest = value;
    while result.len() + 1 < n {
        let Some(i) = index_no_case(rest, separator) else {
            break;
        };
        result.push(&rest[..i]);
        rest = &rest[i + separator.len()..];
    }
    result.push(rest);
    result
}

pub fn consume_while<'s>(input: &mut &'s str, predicate: impl FnMut(&char) -> bool) -> &'s str {
    let len = input.chars().take_while(predicate).map(char::len_utf8).sum();
    if len == 0 {
        return "";
    }
    let result = &input[..len];
    *input = &input[len..];
    result
}

/// Longest prefix of `value` no longer than `max` bytes that ends on a char boundary.
pub fn truncate_str(value: &str, max: usize) -> &str {
    if value.len() <= max {
        return value;
    }
    let end = (0..=max)
        .rev()
        .find(|&i| value.is_char_boundary(i))
        .unwrap_or(0);
    &value[..end]
}

#[macro_export]
macro_rules! truncate_long {
    ($query:expr) => {
        format_args!(
            "{}{}",
            $crate::truncate_str(::std::convert::AsRef::<str>::as_ref(&$query), 497).trim_end(),
            if ::std::convert::AsRef::<str>::as_ref(&$query).len() > 497 {
                "..."
            } else {
                ""
            },
        )
    };
}
