use stanza::style::HAlign::Left;
use stanza::style::{HAlign, Header, MinWidth, Styles};
use stanza::table::{Col, Row, Table};

use crate::summary::{ParamSummary, Summary};

fn interval_header(alpha: f64) -> String {
    format!("{:.0}% interval", (1.0 - alpha) * 100.0)
}

fn summary_cells(summary: &Summary) -> Vec<stanza::table::Cell> {
    vec![
        format!("{:.3}", summary.median).into(),
        format!("{:.3}", summary.mean).into(),
        format!("{:.3}", summary.sd).into(),
        format!("[{:.3}, {:.3}]", summary.lower, summary.upper).into(),
    ]
}

fn numeric_cols() -> Vec<Col> {
    vec![
        Col::new(Styles::default().with(MinWidth(8)).with(HAlign::Right)),
        Col::new(Styles::default().with(MinWidth(8)).with(HAlign::Right)),
        Col::new(Styles::default().with(MinWidth(8)).with(HAlign::Right)),
        Col::new(Styles::default().with(MinWidth(18)).with(HAlign::Right)),
    ]
}

/// Scalar parameters, one per row.
pub fn tabulate_scalars(summaries: &[(String, ParamSummary)], alpha: f64) -> Table {
    let mut cols = vec![Col::new(Styles::default().with(MinWidth(16)).with(Left))];
    cols.extend(numeric_cols());
    let mut table = Table::default().with_cols(cols).with_row(Row::new(
        Styles::default().with(Header(true)),
        vec![
            "Parameter".into(),
            "Median".into(),
            "Mean".into(),
            "SD".into(),
            interval_header(alpha).into(),
        ],
    ));
    for (name, summary) in summaries {
        if let ParamSummary::Scalar(summary) = summary {
            let mut cells = vec![name.clone().into()];
            cells.extend(summary_cells(summary));
            table.push_row(Row::new(Styles::default(), cells));
        }
    }
    table
}

/// One team parameter, teams ranked by median.
pub fn tabulate_teams(param: &str, teams: &[(String, Summary)], alpha: f64) -> Table {
    let mut cols = vec![
        Col::new(Styles::default().with(MinWidth(4)).with(HAlign::Right)),
        Col::new(Styles::default().with(MinWidth(20)).with(Left)),
    ];
    cols.extend(numeric_cols());
    let mut table = Table::default().with_cols(cols).with_row(Row::new(
        Styles::default().with(Header(true)),
        vec![
            "#".into(),
            param.into(),
            "Median".into(),
            "Mean".into(),
            "SD".into(),
            interval_header(alpha).into(),
        ],
    ));
    for (rank, (team, summary)) in teams.iter().enumerate() {
        let mut cells = vec![format!("{}", rank + 1).into(), team.clone().into()];
        cells.extend(summary_cells(summary));
        table.push_row(Row::new(Styles::default(), cells));
    }
    table
}

#[cfg(test)]
mod tests {
    use stanza::renderer::console::Console;
    use stanza::renderer::Renderer;

    use super::*;

    fn summary(median: f64) -> Summary {
        Summary {
            mean: median,
            sd: 0.1,
            lower: median - 0.2,
            median,
            upper: median + 0.2,
        }
    }

    #[test]
    fn scalars_skip_team_summaries() {
        let summaries = vec![
            ("attack".to_string(), ParamSummary::Team(vec![("A".into(), summary(0.0))])),
            ("intercept".to_string(), ParamSummary::Scalar(summary(0.25))),
        ];
        let table = tabulate_scalars(&summaries, 0.05);
        let rendered = Console::default().render(&table).to_string();
        assert!(rendered.contains("intercept"), "{rendered}");
        assert!(rendered.contains("95% interval"), "{rendered}");
        assert!(rendered.contains("[0.050, 0.450]"), "{rendered}");
        assert!(!rendered.contains("attack"), "{rendered}");
    }

    #[test]
    fn teams_ranked() {
        let teams = vec![("B".to_string(), summary(1.0)), ("A".to_string(), summary(0.5))];
        let table = tabulate_teams("attack", &teams, 0.1);
        let rendered = Console::default().render(&table).to_string();
        assert!(rendered.contains("90% interval"), "{rendered}");
        let b = rendered.find('B').unwrap();
        let a = rendered.find('A').unwrap();
        assert!(b < a, "{rendered}");
    }
}
