//! Collaborator traits for the fingerprinting core
//!
//! Which handshakes to send, how to encode them, how to read the reply and
//! how to condense the replies are all supplied from outside. The
//! orchestrator only sequences them.

use anyhow::Result;
use std::fmt::Debug;

/// Opaque probe value handed from the catalog to the builder and parser.
pub trait ProbeDescriptor: Clone + Debug + Send + Sync + 'static {}

impl<T: Clone + Debug + Send + Sync + 'static> ProbeDescriptor for T {}

/// Yields the ordered probe sequence for a host/port.
///
/// Must be deterministic: the same inputs give the same probes in the same
/// order, or hashes stop being comparable.
pub trait ProbeCatalog<P: ProbeDescriptor>: Send + Sync {
    fn probes(&self, host: &str, port: u16) -> Vec<P>;
}

/// Encodes one probe into the bytes written to the wire.
pub trait ProbeBuilder<P: ProbeDescriptor>: Send + Sync {
    fn build(&self, probe: &P) -> Vec<u8>;
}

/// Turns the raw reply to a probe into its canonical text form.
pub trait ResponseParser<P: ProbeDescriptor>: Send + Sync {
    /// `response` is the whole read buffer: the reply bytes followed by
    /// zero fill, always `read_buffer_size` long.
    fn parse(&self, response: &[u8], probe: &P) -> Result<String>;
}

/// Condenses the delimiter-joined probe strings into the final hash.
pub trait FuzzyHasher: Send + Sync {
    fn hash(&self, joined: &str) -> String;
}

impl<F> FuzzyHasher for F
where
    F: Fn(&str) -> String + Send + Sync,
{
    fn hash(&self, joined: &str) -> String {
        self(joined)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, Clone, PartialEq)]
    struct Hello(u8);

    struct TwoProbes;

    impl ProbeCatalog<Hello> for TwoProbes {
        fn probes(&self, _host: &str, port: u16) -> Vec<Hello> {
            vec![Hello(1), Hello((port % 256) as u8)]
        }
    }

    struct EchoParser;

    impl ResponseParser<Hello> for EchoParser {
        fn parse(&self, response: &[u8], probe: &Hello) -> Result<String> {
            if response.is_empty() {
                anyhow::bail!("no response to probe {}", probe.0);
            }
            Ok(format!("{}:{}", probe.0, response.len()))
        }
    }

    #[test]
    fn catalog_is_deterministic() {
        let c = TwoProbes;
        assert_eq!(c.probes("example.test", 443), c.probes("example.test", 443));
        assert_eq!(c.probes("example.test", 443)[1], Hello(187));
    }

    #[test]
    fn parser_reports_failures() {
        let p = EchoParser;
        assert_eq!(p.parse(b"abc", &Hello(2)).unwrap(), "2:3");
        assert!(p.parse(b"", &Hello(2)).is_err());
    }

    #[test]
    fn closures_are_hashers() {
        let h = |s: &str| s.len().to_string();
        assert_eq!(FuzzyHasher::hash(&h, "a,b,c"), "5");
    }
}
