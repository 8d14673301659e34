use crate::infra::InMemoryApplicationRepository;
use chrono::{DateTime, TimeZone, Utc};
use clap::Args;
use job_pipeline::config::PipelineConfig;
use job_pipeline::error::AppError;
use job_pipeline::workflows::analytics::views::{ActivityView, FlowGraphView};
use job_pipeline::workflows::applications::{
    ApplicationView, CompanyId, FixedClock, NewApplication, OwnerId, PipelineService,
};
use job_pipeline::workflows::catalog::{StatusCatalog, StatusId};
use serde::Serialize;
use std::path::PathBuf;
use std::sync::Arc;

const DEMO_CATALOG: &str = "id,stage,name,rank
1,APPLIED,Applied,1
2,SCREEN,Phone screen,2
3,OFFER,Offer,3
";

#[derive(Args, Debug, Default)]
pub(crate) struct DemoArgs {
    /// Print compact JSON instead of the pretty-printed form.
    #[arg(long)]
    pub(crate) compact: bool,
    /// Size of the "recent" window in the activity summary.
    #[arg(long, default_value_t = 30)]
    pub(crate) window_days: u32,
}

#[derive(Args, Debug, Default)]
pub(crate) struct CatalogArgs {
    /// Status catalog CSV with an `id,stage,name,rank` header; defaults to the standard pipeline.
    #[arg(long)]
    pub(crate) csv: Option<PathBuf>,
}

#[derive(Debug, Serialize)]
pub(crate) struct DemoReport {
    pub(crate) application: ApplicationView,
    pub(crate) flow: FlowGraphView,
    pub(crate) activity: ActivityView,
}

pub(crate) fn run_catalog(args: CatalogArgs) -> Result<(), AppError> {
    let catalog = match args.csv {
        Some(path) => StatusCatalog::from_csv_path(path)?,
        None => StatusCatalog::standard(),
    };
    println!("{}", serde_json::to_string_pretty(&catalog.grouped_view())?);
    Ok(())
}

pub(crate) fn run_demo(args: DemoArgs) -> Result<(), AppError> {
    let report = build_demo_report(args.window_days)?;
    let rendered = if args.compact {
        serde_json::to_string(&report)?
    } else {
        serde_json::to_string_pretty(&report)?
    };
    println!("{rendered}");
    Ok(())
}

/// One application moving Applied, Phone screen, Offer over January 2024.
pub(crate) fn build_demo_report(window_days: u32) -> Result<DemoReport, AppError> {
    let catalog = StatusCatalog::from_csv_reader(DEMO_CATALOG.as_bytes())?;
    let now = demo_day(31);
    let service = PipelineService::with_clock(
        Arc::new(catalog),
        Arc::new(InMemoryApplicationRepository::default()),
        PipelineConfig::default(),
        FixedClock(now),
    );
    let owner = OwnerId::new("demo@example.com");

    let record = service.create_application(NewApplication {
        owner: owner.clone(),
        company_id: CompanyId(1),
        title: "Platform Engineer".to_string(),
        location: "Remote".to_string(),
        applied_date: demo_day(1),
        initial_status_id: StatusId(1),
    })?;
    service.transition_at(record.id, &owner, StatusId(2), demo_day(10))?;
    service.transition_at(record.id, &owner, StatusId(3), demo_day(20))?;

    let application = service.get(record.id, &owner)?.view(service.catalog());
    let flow = service.flow_graph(&owner)?.view(service.catalog());
    let activity = service.activity(&owner)?.view(now, window_days);

    Ok(DemoReport {
        application,
        flow,
        activity,
    })
}

fn demo_day(day: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 1, day, 12, 0, 0)
        .single()
        .expect("demo days fall inside January 2024")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn demo_report_matches_walkthrough() {
        let report = build_demo_report(31).expect("demo runs");
        let json = serde_json::to_value(&report).expect("serializes");

        assert_eq!(json["application"]["current_status_id"], 3);
        assert_eq!(json["application"]["applied_date"], "2024-01-01T12:00:00Z");
        assert_eq!(json["application"]["history"].as_array().map(Vec::len), Some(3));
        assert_eq!(
            json["flow"]["edges"],
            serde_json::json!([
                { "from": 1, "to": 2, "weight": 1 },
                { "from": 2, "to": 3, "weight": 1 }
            ])
        );
        let throughputs: Vec<_> = json["flow"]["nodes"]
            .as_array()
            .expect("nodes")
            .iter()
            .map(|node| node["throughput"].as_u64())
            .collect();
        assert_eq!(throughputs, vec![Some(1), Some(1), Some(1)]);

        assert_eq!(json["activity"]["total"], 1);
        assert_eq!(json["activity"]["days"][0]["date"], "2024-01-01");
        assert_eq!(json["activity"]["recent_count"], 1);
    }

    #[test]
    fn window_ending_today_excludes_older_days() {
        // Jan 2..=Jan 31
        let report = build_demo_report(30).expect("demo runs");
        assert_eq!(report.activity.recent_count, 0);
        assert_eq!(report.activity.total, 1);
    }
}
