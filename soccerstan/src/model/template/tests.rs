use super::*;

fn identity(template: &str, parameters: &[&str], team_parameters: &[&str]) -> ModelIdentity {
    ModelIdentity {
        name: "test".into(),
        template: template.into(),
        parameters: parameters.iter().map(ToString::to_string).collect(),
        team_parameters: team_parameters.iter().map(ToString::to_string).collect(),
    }
}

fn compile_str(template: &str) -> Result<CompiledModel, CompileError> {
    let mut parameters = vec![];
    let mut team_parameters = vec![];
    for line in template.lines() {
        let line = line.trim();
        let name = |rest: &str| rest.split('~').next().unwrap().trim().to_string();
        if let Some(rest) = line.strip_prefix("scalar ") {
            parameters.push(name(rest));
        } else if let Some(rest) = line.strip_prefix("team ") {
            team_parameters.push(name(rest));
        }
    }
    parameters.dedup();
    team_parameters.dedup();
    compile(&ModelIdentity {
        name: "test".into(),
        template: template.into(),
        parameters,
        team_parameters,
    })
}

#[test]
fn compile_full_model() {
    let model = compile_str(
        "# comment line\n\
         scalar intercept ~ normal(0, 1)\n\
         team attack ~ normal(0.5, 2.5) # trailing comment\n\
         team defence ~ normal(0, 1)\n\
         \n\
         home_log_rate = intercept + attack[home] - defence[away]\n\
         away_log_rate = -defence[ home ]+intercept+attack[away]\n",
    )
    .unwrap();
    assert_eq!("test", model.name);
    assert_eq!(
        vec![
            ParamDecl {
                name: "intercept".into(),
                kind: ParamKind::Scalar,
                prior: Prior::Normal { mu: 0.0, sigma: 1.0 },
            },
            ParamDecl {
                name: "attack".into(),
                kind: ParamKind::Team,
                prior: Prior::Normal { mu: 0.5, sigma: 2.5 },
            },
            ParamDecl {
                name: "defence".into(),
                kind: ParamKind::Team,
                prior: Prior::Normal { mu: 0.0, sigma: 1.0 },
            },
        ],
        model.params
    );
    assert_eq!(
        vec![
            Term { negated: false, param: 0, index: None },
            Term { negated: false, param: 1, index: Some(Side::Home) },
            Term { negated: true, param: 2, index: Some(Side::Away) },
        ],
        model.home_log_rate
    );
    assert_eq!(
        vec![
            Term { negated: true, param: 2, index: Some(Side::Home) },
            Term { negated: false, param: 0, index: None },
            Term { negated: false, param: 1, index: Some(Side::Away) },
        ],
        model.away_log_rate
    );
    assert_eq!(ParamKind::Team, model.param("attack").unwrap().kind);
    assert!(model.param("missing").is_none());
}

#[test]
fn unknown_statement() {
    assert_eq!(
        CompileError::UnknownStatement { line: 2, text: "vector attack".into() },
        compile_str("scalar a ~ normal(0, 1)\nvector attack\n").unwrap_err()
    );
    assert_eq!(
        CompileError::UnknownStatement { line: 1, text: "goals = a".into() },
        compile_str("goals = a").unwrap_err()
    );
}

#[test]
fn invalid_names() {
    for name in ["home", "1st", "normal", "a-b"] {
        let template = format!("scalar {name} ~ normal(0, 1)");
        assert_eq!(
            CompileError::InvalidName { line: 1, name: name.into() },
            compile(&identity(&template, &[name], &[])).unwrap_err()
        );
    }
}

#[test]
fn duplicate_parameter() {
    assert_eq!(
        CompileError::DuplicateParameter { line: 2, name: "a".into() },
        compile_str("scalar a ~ normal(0, 1)\nteam a ~ normal(0, 1)").unwrap_err()
    );
}

#[test]
fn invalid_priors() {
    for prior in ["normal(0, 0)", "normal(0, -1)", "normal(0)", "normal(0, 1, 2)", "cauchy(0, 1)", "normal(a, 1)", "normal 0, 1"] {
        let err = compile_str(&format!("scalar a ~ {prior}")).unwrap_err();
        assert_eq!(CompileError::InvalidPrior { line: 1, text: prior.into() }, err);
    }
    assert!(matches!(
        compile_str("scalar a").unwrap_err(),
        CompileError::InvalidPrior { line: 1, .. }
    ));
}

#[test]
fn duplicate_rate() {
    assert_eq!(
        CompileError::DuplicateRate { line: 3, rate: "home_log_rate" },
        compile_str("scalar a ~ normal(0, 1)\nhome_log_rate = a\nhome_log_rate = a").unwrap_err()
    );
}

#[test]
fn undeclared_parameter() {
    assert_eq!(
        CompileError::UndeclaredParameter { line: 2, name: "b".into() },
        compile_str("scalar a ~ normal(0, 1)\nhome_log_rate = a + b").unwrap_err()
    );
}

#[test]
fn parameters_must_be_declared_before_use() {
    assert_eq!(
        CompileError::UndeclaredParameter { line: 1, name: "a".into() },
        compile_str("home_log_rate = a\nscalar a ~ normal(0, 1)").unwrap_err()
    );
}

#[test]
fn indexing_rules() {
    let template = "scalar a ~ normal(0, 1)\nteam t ~ normal(0, 1)\n";
    assert_eq!(
        CompileError::IndexedScalar { line: 3, name: "a".into() },
        compile_str(&format!("{template}home_log_rate = a[home]")).unwrap_err()
    );
    assert_eq!(
        CompileError::UnindexedTeamParameter { line: 3, name: "t".into() },
        compile_str(&format!("{template}home_log_rate = a + t")).unwrap_err()
    );
    assert_eq!(
        CompileError::InvalidIndex { line: 3, index: "neutral".into() },
        compile_str(&format!("{template}home_log_rate = t[neutral]")).unwrap_err()
    );
    assert!(matches!(
        compile_str(&format!("{template}home_log_rate = t[home")).unwrap_err(),
        CompileError::MalformedExpression { line: 3, .. }
    ));
}

#[test]
fn malformed_expressions() {
    for expression in ["", "a +", "a b", "a * 2", "+ - a", "2"] {
        let err = compile_str(&format!("scalar a ~ normal(0, 1)\nhome_log_rate = {expression}")).unwrap_err();
        assert_eq!(
            CompileError::MalformedExpression { line: 2, text: expression.into() },
            err,
            "for {expression:?}"
        );
    }
}

#[test]
fn missing_rates() {
    assert_eq!(
        CompileError::MissingRate("away_log_rate"),
        compile_str("scalar a ~ normal(0, 1)\nhome_log_rate = a").unwrap_err()
    );
    assert_eq!(
        CompileError::MissingRate("home_log_rate"),
        compile_str("scalar a ~ normal(0, 1)").unwrap_err()
    );
    assert_eq!(CompileError::NoParameters, compile_str("# nothing here").unwrap_err());
}

#[test]
fn identity_must_match_template() {
    let template = "scalar a ~ normal(0, 1)\nteam t ~ normal(0, 1)\nhome_log_rate = a + t[home]\naway_log_rate = a + t[away]";
    compile(&identity(template, &["a"], &["t"])).unwrap();

    let err = compile(&identity(template, &["a", "b"], &["t"])).unwrap_err();
    assert_eq!(
        "model 'test' lists {\"a\", \"b\"} as scalar parameters but its template declares {\"a\"}",
        err.to_string()
    );
    assert!(matches!(
        compile(&identity(template, &["a"], &[])).unwrap_err(),
        CompileError::IdentityMismatch { kind: ParamKind::Team, .. }
    ));
}

#[test]
fn compiled_model_survives_encoding() {
    let model = compile_str("scalar a ~ normal(0.25, 1)\nteam t ~ normal(0, 3)\nhome_log_rate = a + t[home]\naway_log_rate = a - t[away]").unwrap();
    let bytes = bincode::encode_to_vec(&model, bincode::config::standard()).unwrap();
    let (decoded, _): (CompiledModel, usize) = bincode::decode_from_slice(&bytes, bincode::config::standard()).unwrap();
    assert_eq!(model, decoded);
}
