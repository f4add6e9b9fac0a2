//! `eventide config`: print the resolved configuration.

use crate::config::Config;

/// Print the configuration with secrets redacted.
///
/// `section` limits output to one top-level section (e.g. "agent").
pub fn run_config_command(config: &Config, section: Option<&str>) -> anyhow::Result<()> {
    let rendered = config.to_string();
    let Some(section) = section else {
        println!("{}", rendered);
        return Ok(());
    };

    let header = format!("{}:", section.trim_end_matches(':'));
    let mut lines = rendered.lines().skip_while(|line| *line != header);
    let Some(first) = lines.next() else {
        anyhow::bail!("unknown config section '{}'", section);
    };
    println!("{}", first);
    for line in lines.take_while(|line| line.starts_with(' ')) {
        println!("{}", line);
    }
    Ok(())
}
