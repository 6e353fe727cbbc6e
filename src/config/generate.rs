pub fn generate_starter_config() -> String {
    r#"# =============================================================================
# WAVESTREAM CONFIGURATION
# =============================================================================
# Streams waveform data from a trace catalog in fixed time windows.
#
# Config file locations (in order of precedence):
#   1. Path specified via --config argument
#   2. ~/.config/wavestream/config.yml
#   3. /etc/wavestream/config.yml
#
# Paths may use ~ and $env{VAR} expansion.

# =============================================================================
# PROVIDER
# =============================================================================
provider:
  # Catalog files listing the available traces (YAML lists of trace records)
  catalogs:
    - ~/waveforms/catalog.yml

  # Optional time bounds (RFC 3339). When omitted, the extent of the catalog
  # is used. Bounds passed on the command line take precedence.
  # start_time: 2026-01-28T00:00:00Z
  # end_time: 2026-01-29T00:00:00Z

  # Channel selector, at most 3 characters; '*' and '?' are wildcards.
  # Use e.g. 'EN?' to select all accelerometer channels.
  channel_selector: "*"

  # Number of batches the background prefetcher may hold ahead of the consumer
  prefetch_batches: 10

  # 'complete' keeps only traces covering a whole (padded) window,
  # 'incomplete' also keeps partial traces at window edges
  completeness: complete

# =============================================================================
# STREAM
# =============================================================================
stream:
  # Step between successive window starts
  window_increment: 10m
  # Extra time fetched on both sides of each window
  window_padding: 30s
  # Batches shorter than this are skipped (optional)
  min_length: 5m

# =============================================================================
# STATIONS
# =============================================================================
# NET.STA.LOC codes, as strings or [network, station, location] lists
stations:
  - "6E.TE01."
  - "6E.TE02."
  - ["6E", "TE03", ""]
"#
    .to_string()
}
