//! Prometheus text exposition format.
//!
//! Renders a [`FleetSnapshot`] for scraping by a Prometheus server or
//! compatible agent.

use crate::collector::FleetSnapshot;

fn header(out: &mut String, name: &str, help: &str, kind: &str) {
    out.push_str(&format!("# HELP {name} {help}\n"));
    out.push_str(&format!("# TYPE {name} {kind}\n"));
}

/// Render a fleet snapshot into Prometheus text format.
pub fn render_prometheus(s: &FleetSnapshot) -> String {
    let mut out = String::new();

    header(&mut out, "skirmish_workers_ready", "Workers that announced readiness.", "gauge");
    out.push_str(&format!("skirmish_workers_ready {}\n", s.workers_ready));

    header(
        &mut out,
        "skirmish_worker_restarts_total",
        "Worker processes respawned after exiting.",
        "counter",
    );
    for (id, restarts, _) in &s.workers {
        out.push_str(&format!(
            "skirmish_worker_restarts_total{{worker=\"{id}\"}} {restarts}\n"
        ));
    }

    header(
        &mut out,
        "skirmish_worker_crash_loops_total",
        "Times a worker slot was flagged as crash-looping.",
        "counter",
    );
    for (id, _, loops) in &s.workers {
        out.push_str(&format!(
            "skirmish_worker_crash_loops_total{{worker=\"{id}\"}} {loops}\n"
        ));
    }

    header(&mut out, "skirmish_lobby_ticks_total", "Polling ticks completed.", "counter");
    out.push_str(&format!("skirmish_lobby_ticks_total {}\n", s.ticks));

    header(
        &mut out,
        "skirmish_lobby_polls_total",
        "Per-lobby status fetches by result.",
        "counter",
    );
    out.push_str(&format!("skirmish_lobby_polls_total{{result=\"ok\"}} {}\n", s.polls_ok));
    out.push_str(&format!(
        "skirmish_lobby_polls_total{{result=\"failed\"}} {}\n",
        s.polls_failed
    ));

    header(&mut out, "skirmish_lobbies_tracked", "Public lobbies currently tracked.", "gauge");
    out.push_str(&format!("skirmish_lobbies_tracked {}\n", s.lobbies_tracked));

    header(
        &mut out,
        "skirmish_lobbies_pruned_total",
        "Public lobbies removed from the listing by reason.",
        "counter",
    );
    for (reason, count) in [
        ("started", s.pruned_started),
        ("full", s.pruned_full),
        ("missing", s.pruned_missing),
    ] {
        out.push_str(&format!(
            "skirmish_lobbies_pruned_total{{reason=\"{reason}\"}} {count}\n"
        ));
    }

    header(
        &mut out,
        "skirmish_lobbies_created_total",
        "Public lobbies created by the scheduler.",
        "counter",
    );
    out.push_str(&format!("skirmish_lobbies_created_total {}\n", s.lobbies_created));

    header(
        &mut out,
        "skirmish_schedule_failures_total",
        "Failed public lobby creation attempts.",
        "counter",
    );
    out.push_str(&format!("skirmish_schedule_failures_total {}\n", s.schedule_failures));

    header(
        &mut out,
        "skirmish_rate_limited_total",
        "Client requests rejected by the rate limiter.",
        "counter",
    );
    out.push_str(&format!("skirmish_rate_limited_total {}\n", s.rate_limited));

    out
}
