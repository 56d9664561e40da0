use std::error::Error;

/// Sink for progress and diagnostics. `error` is the severe level.
pub trait Reporter {
    fn info(&mut self, msg: &str);
    fn warn(&mut self, msg: &str);
    fn error(&mut self, msg: &str);
}

/// Render an error with every cause in its source chain, `outer: inner: root`.
pub fn diagnostic(err: &dyn Error) -> String {
    let mut out = err.to_string();
    let mut source = err.source();
    while let Some(cause) = source {
        let text = cause.to_string();
        if !out.ends_with(&text) {
            out.push_str(": ");
            out.push_str(&text);
        }
        source = cause.source();
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use thiserror::Error;

    #[derive(Debug, Error)]
    #[error("root cause")]
    struct Root;

    #[derive(Debug, Error)]
    #[error("outer failure")]
    struct Outer(#[source] Root);

    #[test]
    fn diagnostic_includes_source_chain() {
        assert_eq!(diagnostic(&Outer(Root)), "outer failure: root cause");
    }

    #[test]
    fn diagnostic_of_leaf_error_is_its_message() {
        assert_eq!(diagnostic(&Root), "root cause");
    }
}
