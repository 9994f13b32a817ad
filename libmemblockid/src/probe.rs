use thiserror::Error;

use crate::{
    extract::extract_block_size,
    matcher::{RuleMatch, match_format},
    reader::ProbeBuffer,
    registry::{BlockType, FormatDescriptor, REGISTRY, SignatureRule, UsageType, position},
};

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    #[error("Unknown filesystem format in filter: \"{0}\"")]
    UnknownFormat(String),
    #[error("Filter inclusion set is empty")]
    EmptyFilter,
}

/// Set of formats a [`Probe`] considers.
///
/// Either every registered format (the default) or a validated, non-empty
/// inclusion set. Candidates are always visited in registration order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProbeConfig {
    filter: Option<Vec<usize>>,
}

impl ProbeConfig {
    /// Consider every registered format.
    pub fn all() -> ProbeConfig {
        return ProbeConfig { filter: None };
    }

    pub fn builder() -> ProbeConfigBuilder {
        return ProbeConfigBuilder::default();
    }

    pub fn is_filtered(&self) -> bool {
        return self.filter.is_some();
    }

    /// Candidate formats in registration order.
    pub fn formats(&self) -> impl Iterator<Item = &'static FormatDescriptor> + '_ {
        let indices: Box<dyn Iterator<Item = usize> + '_> = match &self.filter {
            Some(filter) => Box::new(filter.iter().copied()),
            None => Box::new(0..REGISTRY.len()),
        };

        return indices.filter_map(|i| REGISTRY.get(i));
    }
}

#[derive(Debug, Clone, Default)]
pub struct ProbeConfigBuilder {
    names: Option<Vec<String>>,
}

impl ProbeConfigBuilder {
    /// Add one format to the inclusion set.
    pub fn format(mut self, name: impl Into<String>) -> ProbeConfigBuilder {
        self.names.get_or_insert_with(Vec::new).push(name.into());
        return self;
    }

    /// Add several formats to the inclusion set.
    ///
    /// Calling this, even with an empty iterator, turns the config into an
    /// inclusion set.
    pub fn formats<I, S>(mut self, names: I) -> ProbeConfigBuilder
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.names
            .get_or_insert_with(Vec::new)
            .extend(names.into_iter().map(Into::into));
        return self;
    }

    /// Validate the inclusion set against the registry.
    ///
    /// # Errors
    /// - [`ConfigError::EmptyFilter`] if an inclusion set was started but holds no names.
    /// - [`ConfigError::UnknownFormat`] for the first name not in the registry.
    pub fn build(self) -> Result<ProbeConfig, ConfigError> {
        let Some(names) = self.names else {
            return Ok(ProbeConfig::all());
        };

        if names.is_empty() {
            return Err(ConfigError::EmptyFilter);
        }

        let mut filter = names
            .into_iter()
            .map(|name| position(&name).ok_or(ConfigError::UnknownFormat(name)))
            .collect::<Result<Vec<usize>, ConfigError>>()?;

        filter.sort_unstable();
        filter.dedup();

        return Ok(ProbeConfig {
            filter: Some(filter),
        });
    }
}

/// Successful identification of a single format.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
pub struct FormatMatch {
    pub btype: BlockType,
    pub name: &'static str,
    pub usage: UsageType,
    /// Filesystem allocation unit in bytes, `None` when it could not be decoded.
    pub block_size: Option<u64>,
    pub sbmagic: &'static [u8],
    pub sbmagic_offset: u64,
}

#[derive(Debug, Clone, Eq, PartialEq, Hash)]
pub enum ProbeResult {
    Matched(FormatMatch),
    NoMatch,
    /// Several candidates left equally ranked, in registration order. Formats
    /// in one detection table never tie on registration order, so [`run`]
    /// always resolves a hit to [`ProbeResult::Matched`].
    Ambiguous(Vec<&'static str>),
}

impl ProbeResult {
    pub fn as_match(&self) -> Option<&FormatMatch> {
        match self {
            Self::Matched(m) => return Some(m),
            _ => return None,
        }
    }

    pub fn is_match(&self) -> bool {
        return self.as_match().is_some();
    }

    pub fn name(&self) -> Option<&'static str> {
        return self.as_match().map(|m| m.name);
    }

    pub fn block_type(&self) -> Option<BlockType> {
        return self.as_match().map(|m| m.btype);
    }

    pub fn block_size(&self) -> Option<u64> {
        return self.as_match().and_then(|m| m.block_size);
    }
}

#[derive(Debug, Clone, Copy)]
struct Hit {
    desc: &'static FormatDescriptor,
    rule: &'static SignatureRule,
    kind: RuleMatch,
}

/// Stateless detector bound to one validated [`ProbeConfig`].
///
/// A `Probe` holds no per-run state, so one instance can be shared across
/// threads and reused for any number of buffers.
#[derive(Debug, Clone, Default)]
pub struct Probe {
    config: ProbeConfig,
}

impl Probe {
    pub fn new(config: ProbeConfig) -> Probe {
        return Probe { config };
    }

    pub fn config(&self) -> &ProbeConfig {
        return &self.config;
    }

    /// Identify the format in `buffer`.
    ///
    /// Every candidate format is matched, then:
    /// - a hit whose signature passed a validator outranks a magic-only hit;
    /// - among the best ranked hits, the earliest registered one wins.
    pub fn run(&self, buffer: &[u8]) -> ProbeResult {
        return run(buffer, &self.config);
    }
}

/// Identify the format in `buffer` among the candidates allowed by `config`.
pub fn run(buffer: &[u8], config: &ProbeConfig) -> ProbeResult {
    let buf = ProbeBuffer::new(buffer);

    let hits: Vec<Hit> = config
        .formats()
        .filter_map(|desc| {
            let (rule, kind) = match_format(desc, &buf)?;
            log::debug!(
                "run - {}: {kind:?} match of {:02x?} at {:#x}",
                desc.name(),
                rule.magic,
                rule.b_offset
            );
            Some(Hit { desc, rule, kind })
        })
        .collect();

    let Some(best) = hits.iter().map(|hit| hit.kind).max() else {
        return ProbeResult::NoMatch;
    };

    let top: Vec<&Hit> = hits.iter().filter(|hit| hit.kind == best).collect();

    let Some(winner) = top.first().copied() else {
        return ProbeResult::NoMatch;
    };

    if top.len() > 1 {
        let names: Vec<&'static str> = top.iter().map(|hit| hit.desc.name()).collect();
        log::debug!("run - {} wins by registration order over {names:?}", winner.desc.name());
    }

    let block_size = match extract_block_size(winner.desc, &buf, winner.rule) {
        Ok(size) => Some(size),
        Err(e) => {
            log::debug!("run - {}: block size unknown: {e}", winner.desc.name());
            None
        }
    };

    return ProbeResult::Matched(FormatMatch {
        btype: winner.desc.btype,
        name: winner.desc.name(),
        usage: winner.desc.usage,
        block_size,
        sbmagic: winner.rule.magic,
        sbmagic_offset: winner.rule.b_offset,
    });
}
