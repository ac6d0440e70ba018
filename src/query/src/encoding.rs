use percent_encoding::utf8_percent_encode;
use percent_encoding::AsciiSet;
use percent_encoding::CONTROLS;

/// Characters that would end or split a query parameter, or change how the
/// server decodes it. JSON punctuation stays readable.
const PARAM_VALUE: &AsciiSet = &CONTROLS
    .add(b' ')
    .add(b'"')
    .add(b'#')
    .add(b'%')
    .add(b'&')
    .add(b'+')
    .add(b'<')
    .add(b'=')
    .add(b'>')
    .add(b'\\')
    .add(b'`');

/// Percent-encodes a caller supplied string before it is placed into a
/// request parameter. Non-ASCII input is encoded as UTF-8.
pub fn encode_value(value: &str) -> String {
    utf8_percent_encode(value, PARAM_VALUE).to_string()
}

#[cfg(test)]
mod tests {
    use crate::encoding::encode_value;

    #[test]
    fn test_encode_value() {
        assert_eq!(encode_value("Play Song"), "Play%20Song");
        assert_eq!(encode_value("C#"), "C%23");
        assert_eq!(encode_value("a&b"), "a%26b");
        assert_eq!(encode_value("A+B"), "A%2BB");
        assert_eq!(encode_value("100%"), "100%25");
        assert_eq!(encode_value(r#"say "hi""#), "say%20%22hi%22");
        assert_eq!(encode_value("gp:plan"), "gp:plan");
        assert_eq!(encode_value("[[0,4]]"), "[[0,4]]");
        assert_eq!(encode_value("café"), "caf%C3%A9");
    }
}
