//! Unit tests for the `vultr-machine` CLI binary implementation.

use super::*;
use clap::CommandFactory;
use rstest::rstest;
use vultr_machine::flags::{DriverOptions, FLAGS};

fn parse_create(extra: &[&str]) -> CreateCommand {
    let mut argv = vec!["vultr-machine", "create", "box", "--vultr-api-key", "secret"];
    argv.extend_from_slice(extra);
    match Cli::try_parse_from(argv) {
        Ok(Cli::Create(args)) => *args,
        Ok(other) => panic!("expected create, got {other:?}"),
        Err(err) => panic!("parse failed: {err}"),
    }
}

#[test]
fn create_arguments_mirror_the_flag_table() {
    let command = Cli::command();
    let create = command
        .find_subcommand("create")
        .unwrap_or_else(|| panic!("create subcommand missing"));
    let longs: Vec<&str> = create
        .get_arguments()
        .filter_map(clap::Arg::get_long)
        .filter(|long| long.starts_with("vultr-"))
        .collect();
    assert_eq!(longs.len(), FLAGS.len(), "flags: {longs:?}");

    for spec in FLAGS {
        let arg = create
            .get_arguments()
            .find(|arg| arg.get_long() == Some(spec.name))
            .unwrap_or_else(|| panic!("no argument for --{}", spec.name));
        assert_eq!(
            arg.get_env().and_then(|env| env.to_str()),
            Some(spec.env_var),
            "env alias of --{}",
            spec.name
        );
        if let Some(expected) = spec.default_text() {
            let defaults: Vec<_> = arg
                .get_default_values()
                .iter()
                .filter_map(|value| value.to_str())
                .collect();
            assert_eq!(defaults, vec![expected.as_str()], "default of --{}", spec.name);
        }
    }
}

#[test]
fn option_map_carries_parsed_values() {
    let args = parse_create(&[
        "--vultr-server-type",
        "2",
        "--vultr-tags",
        "web,edge",
        "--vultr-open-docker-port",
        "--vultr-label",
        "front",
    ]);
    let options = option_map(&args).unwrap_or_else(|err| panic!("option map: {err}"));

    assert_eq!(options.string(flags::API_KEY), "secret");
    assert_eq!(options.int(flags::SERVER_TYPE), 2);
    assert_eq!(
        options.string_list(flags::TAGS),
        vec![String::from("web"), String::from("edge")]
    );
    assert!(options.bool(flags::OPEN_DOCKER_PORT));
    assert_eq!(options.string(flags::LABEL), "front");
    assert_eq!(options.string(flags::HOSTNAME), "");
}

#[test]
fn option_map_defaults_resolve_to_named_machine() {
    let args = parse_create(&[]);
    let options = option_map(&args).unwrap_or_else(|err| panic!("option map: {err}"));
    let resolved = resolve(&options, "box").unwrap_or_else(|err| panic!("resolve: {err}"));

    assert_eq!(resolved.request.hostname, "box");
    assert_eq!(resolved.request.label, "box");
    assert_eq!(resolved.request.region, "ewr");
    assert_eq!(resolved.settings.docker_port, 2376);
    assert_eq!(resolved.settings.ssh_user, "root");
}

#[rstest]
#[case::missing_api_key_value(&["vultr-machine", "create", "box", "--vultr-api-key"])]
#[case::missing_name(&["vultr-machine", "ip", "--vultr-api-key", "k"])]
#[case::unknown_command(&["vultr-machine", "launch", "box"])]
fn parser_rejects_incomplete_invocations(#[case] argv: &[&str]) {
    assert!(Cli::try_parse_from(argv).is_err());
}

#[test]
fn write_error_renders_message_with_newline() {
    let mut buffer = Vec::new();
    write_error(
        &mut buffer,
        &CliError::Interrupted {
            name: String::from("box"),
        },
    );
    let text = String::from_utf8(buffer).unwrap_or_else(|err| panic!("utf8: {err}"));

    assert_eq!(
        text,
        "interrupted while creating box; run `vultr-machine rm box` to clean up\n"
    );
}
