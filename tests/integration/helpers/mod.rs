//! Helper utilities for integration tests.

use std::io::Cursor;

use bayescall_lib::config::Config;
use bayescall_lib::pileup::{PileupReader, SitePileup, TargetRegions};

/// One sample's pileup recipe at a site: `(sample, class, seq, count, qual)`.
pub type ObsSpec<'a> = (&'a str, char, &'a str, usize, u8);

/// Renders observation lines for one site.
///
/// Read identifiers are unique per observation so the read-dependence
/// factor stays out of the way unless a test wants it.
pub fn site_text(chrom: &str, pos: u64, ref_base: &str, specs: &[ObsSpec<'_>]) -> String {
    let mut lines = String::new();
    let mut read = 0usize;
    for (sample, class, seq, count, qual) in specs {
        for i in 0..*count {
            let strand = if i % 2 == 0 { '+' } else { '-' };
            lines.push_str(&format!(
                "{chrom}\t{pos}\t{ref_base}\t{sample}\tr{read}\t{class}\t{seq}\t{qual}\t60\t{strand}\n"
            ));
            read += 1;
        }
    }
    lines
}

/// Parses a single site out of rendered observation text.
pub fn read_site(text: &str, config: &Config) -> SitePileup {
    let mut reader = PileupReader::new(
        Cursor::new(text.to_string()),
        config.clone(),
        TargetRegions::default(),
        None,
    );
    reader.next_site().expect("pileup parses").expect("one site present")
}

/// The scenario configuration: diploid, theta = 0.001, default priors.
pub fn scenario_config(pvl: f64) -> Config {
    Config { theta: 0.001, pvl, ..Config::default() }
}
