//! The upstream pileup contract and a text-backed producer.
//!
//! The inference core consumes [`SitePileup`] values: one reference
//! position with each sample's observation bag, ploidies, and a target
//! flag. Producing them from alignments is out of scope; this module
//! supplies the minimal producer used by the CLI and the end-to-end tests,
//! a reader over a tab-separated observation stream sorted by reference
//! coordinate:
//!
//! ```text
//! chrom  pos  ref  sample  read_id  class  seq  base_qual  map_qual  strand
//! ```
//!
//! `class` is one of `R` (reference), `S` (SNP), `M` (MNP), `I`
//! (insertion), `D` (deletion); `seq` is the allele base string (the
//! deleted sequence for `D`, the inserted sequence for `I`); `strand` is
//! `+` or `-`. Lines starting with `#` are comments.
//!
//! Upstream filters live here: minimum base quality, minimum mapping
//! quality, and the admitted allele classes. Reference-class observations
//! are always admitted.

use std::io::BufRead;

use crate::allele::{Allele, AlleleClass, Observation, Strand};
use crate::config::Config;
use crate::errors::{CallerError, Result};
use crate::sample::Sample;

/// One reference position's observations, ready for inference.
#[derive(Debug, Clone)]
pub struct SitePileup {
    /// Reference sequence name
    pub chrom: String,
    /// 1-based reference position
    pub pos: u64,
    /// Reference base at the position
    pub ref_base: String,
    /// Samples with their observation bags, in canonical order
    pub samples: Vec<(String, Sample)>,
    /// Ploidy per sample, parallel to `samples`
    pub ploidies: Vec<u32>,
    /// False when the position falls outside the configured targets
    pub in_target: bool,
}

/// Half-open target intervals, BED-style.
#[derive(Debug, Clone, Default)]
pub struct TargetRegions {
    regions: Vec<(String, u64, u64)>,
}

impl TargetRegions {
    /// Builds target regions from `(chrom, start, end)` triples with
    /// 0-based half-open coordinates.
    #[must_use]
    pub fn new(regions: Vec<(String, u64, u64)>) -> Self {
        TargetRegions { regions }
    }

    /// Parses BED-shaped lines (`chrom<TAB>start<TAB>end`).
    pub fn from_bed<R: BufRead>(reader: R) -> Result<Self> {
        let mut regions = Vec::new();
        for (idx, line) in reader.lines().enumerate() {
            let line = line.map_err(|e| CallerError::InvalidPileup {
                line: idx as u64 + 1,
                reason: format!("I/O error reading targets: {e}"),
            })?;
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            let fields: Vec<&str> = line.split('\t').collect();
            if fields.len() < 3 {
                return Err(CallerError::InvalidPileup {
                    line: idx as u64 + 1,
                    reason: format!("expected 3 BED fields, got {}", fields.len()),
                });
            }
            let start = parse_u64(fields[1], idx as u64 + 1, "start")?;
            let end = parse_u64(fields[2], idx as u64 + 1, "end")?;
            regions.push((fields[0].to_string(), start, end));
        }
        Ok(TargetRegions { regions })
    }

    /// True when no targets are configured (everything is in target) or
    /// the 1-based position falls inside a region.
    #[must_use]
    pub fn contains(&self, chrom: &str, pos: u64) -> bool {
        if self.regions.is_empty() {
            return true;
        }
        self.regions.iter().any(|(c, start, end)| c == chrom && pos > *start && pos <= *end)
    }
}

fn parse_u64(field: &str, line: u64, what: &str) -> Result<u64> {
    field.parse().map_err(|_| CallerError::InvalidPileup {
        line,
        reason: format!("invalid {what}: '{field}'"),
    })
}

#[derive(Debug)]
struct ObservationLine {
    chrom: String,
    pos: u64,
    ref_base: String,
    sample: String,
    observation: Option<Observation>,
}

/// Streaming reader over the tab-separated observation format.
pub struct PileupReader<R: BufRead> {
    input: R,
    config: Config,
    targets: TargetRegions,
    /// Explicit canonical sample order; when absent, samples are ordered
    /// by name per site
    sample_list: Option<Vec<String>>,
    line_number: u64,
    pending: Option<ObservationLine>,
    last_site: Option<(String, u64)>,
    done: bool,
}

impl<R: BufRead> PileupReader<R> {
    /// Creates a reader applying the configuration's upstream filters.
    #[must_use]
    pub fn new(
        input: R,
        config: Config,
        targets: TargetRegions,
        sample_list: Option<Vec<String>>,
    ) -> Self {
        PileupReader {
            input,
            config,
            targets,
            sample_list,
            line_number: 0,
            pending: None,
            last_site: None,
            done: false,
        }
    }

    fn parse_line(&self, raw: &str) -> Result<ObservationLine> {
        let fields: Vec<&str> = raw.split('\t').collect();
        if fields.len() != 10 {
            return Err(CallerError::InvalidPileup {
                line: self.line_number,
                reason: format!("expected 10 fields, got {}", fields.len()),
            });
        }
        let pos = parse_u64(fields[1], self.line_number, "position")?;
        let class = match fields[5] {
            "R" => AlleleClass::Reference,
            "S" => AlleleClass::Snp,
            "M" => AlleleClass::Mnp,
            "I" => AlleleClass::Insertion,
            "D" => AlleleClass::Deletion,
            other => {
                return Err(CallerError::InvalidPileup {
                    line: self.line_number,
                    reason: format!("unknown allele class '{other}'"),
                })
            }
        };
        let base_qual: u8 = fields[7].parse().map_err(|_| CallerError::InvalidPileup {
            line: self.line_number,
            reason: format!("invalid base quality '{}'", fields[7]),
        })?;
        let map_qual: u8 = fields[8].parse().map_err(|_| CallerError::InvalidPileup {
            line: self.line_number,
            reason: format!("invalid mapping quality '{}'", fields[8]),
        })?;
        let strand = match fields[9] {
            "+" => Strand::Forward,
            "-" => Strand::Reverse,
            other => {
                return Err(CallerError::InvalidPileup {
                    line: self.line_number,
                    reason: format!("invalid strand '{other}'"),
                })
            }
        };

        let seq = fields[6];
        let allele = match class {
            AlleleClass::Reference => Allele::reference(seq),
            AlleleClass::Snp => Allele::snp(seq),
            AlleleClass::Mnp => Allele::mnp(seq),
            AlleleClass::Insertion => Allele::insertion(seq),
            AlleleClass::Deletion => Allele::deletion(seq),
        };

        let admitted = match class {
            AlleleClass::Reference => true,
            AlleleClass::Snp => self.config.allow_snps,
            AlleleClass::Mnp => self.config.allow_mnps,
            AlleleClass::Insertion | AlleleClass::Deletion => self.config.allow_indels,
        };
        let passes_quality = base_qual >= self.config.min_base_quality
            && map_qual >= self.config.min_mapping_quality;

        let observation = (admitted && passes_quality).then(|| Observation {
            allele,
            read_id: fields[4].to_string(),
            base_qual,
            map_qual,
            strand,
        });

        Ok(ObservationLine {
            chrom: fields[0].to_string(),
            pos,
            ref_base: fields[2].to_string(),
            sample: fields[3].to_string(),
            observation,
        })
    }

    fn next_line(&mut self) -> Result<Option<ObservationLine>> {
        loop {
            let mut raw = String::new();
            self.line_number += 1;
            let read = self.input.read_line(&mut raw).map_err(|e| CallerError::InvalidPileup {
                line: self.line_number,
                reason: format!("I/O error: {e}"),
            })?;
            if read == 0 {
                return Ok(None);
            }
            let trimmed = raw.trim_end_matches(['\n', '\r']);
            if trimmed.is_empty() || trimmed.starts_with('#') {
                continue;
            }
            return self.parse_line(trimmed).map(Some);
        }
    }

    /// Yields the next site, or `None` at end of stream.
    ///
    /// Observations are grouped by consecutive (chrom, pos); a position
    /// regression within a chromosome is an ordering error.
    pub fn next_site(&mut self) -> Result<Option<SitePileup>> {
        if self.done {
            return Ok(None);
        }

        let first = match self.pending.take() {
            Some(line) => line,
            None => match self.next_line()? {
                Some(line) => line,
                None => {
                    self.done = true;
                    return Ok(None);
                }
            },
        };

        if let Some((last_chrom, last_pos)) = &self.last_site {
            if *last_chrom == first.chrom && first.pos < *last_pos {
                return Err(CallerError::PileupOutOfOrder {
                    line: self.line_number,
                    chrom: first.chrom.clone(),
                    pos: first.pos,
                    prev_chrom: last_chrom.clone(),
                    prev_pos: *last_pos,
                });
            }
        }
        self.last_site = Some((first.chrom.clone(), first.pos));

        let chrom = first.chrom.clone();
        let pos = first.pos;
        let ref_base = first.ref_base.clone();

        let mut lines = vec![first];
        loop {
            match self.next_line()? {
                Some(line) if line.chrom == chrom && line.pos == pos => {
                    if line.ref_base != ref_base {
                        return Err(CallerError::InvalidPileup {
                            line: self.line_number,
                            reason: format!(
                                "reference base mismatch at {chrom}:{pos}: '{}' vs '{}'",
                                line.ref_base, ref_base
                            ),
                        });
                    }
                    lines.push(line);
                }
                Some(line) => {
                    self.pending = Some(line);
                    break;
                }
                None => {
                    self.done = true;
                    break;
                }
            }
        }

        // Assemble samples in canonical order: the explicit list when one
        // was given, otherwise sorted by name.
        let mut names: Vec<String> = match &self.sample_list {
            Some(list) => list.clone(),
            None => {
                let mut names: Vec<String> =
                    lines.iter().map(|l| l.sample.clone()).collect();
                names.sort();
                names.dedup();
                names
            }
        };
        if self.sample_list.is_some() {
            // Keep only samples actually present at this site
            let present: Vec<&str> = lines.iter().map(|l| l.sample.as_str()).collect();
            names.retain(|name| present.contains(&name.as_str()));
        }

        let mut samples: Vec<(String, Sample)> =
            names.iter().map(|name| (name.clone(), Sample::new())).collect();
        for line in lines {
            if let Some(obs) = line.observation {
                if let Some((_, sample)) = samples.iter_mut().find(|(n, _)| *n == line.sample) {
                    sample.add_observation(obs);
                }
            }
        }

        let ploidies: Vec<u32> = samples.iter().map(|(n, _)| self.config.ploidy_of(n)).collect();
        let in_target = self.targets.contains(&chrom, pos);

        Ok(Some(SitePileup { chrom, pos, ref_base, samples, ploidies, in_target }))
    }
}
