use anyhow::{bail, Context};
use cert_store::{default_data_dir, AltNames, CertStore};
use clap::{Args, Parser, Subcommand};
use std::net::IpAddr;
use std::path::{Path, PathBuf};

const SUPPORTED_ORGS: &[(&str, &str)] = &[
    ("azure", "Azure"),
    ("firebase", "Firebase"),
    ("github", "Github"),
    ("gitlab", "Gitlab"),
    ("token", "Token"),
];

#[derive(Debug, Parser)]
#[command(name = "cert-store", about = "Manage the webhook's PKI", version)]
struct Cli {
    /// Directory holding the pki files. Defaults to `<data dir>/pki`.
    #[arg(long = "pki-dir", global = true, env = "GUARD_PKI_DIR")]
    pki_dir: Option<PathBuf>,

    /// Overwrite existing pairs without asking.
    #[arg(long, global = true)]
    force: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Generate certificate pairs
    #[command(subcommand)]
    Init(InitCommand),
    /// Print stored certificates
    #[command(subcommand)]
    Get(GetCommand),
}

#[derive(Debug, Subcommand)]
enum InitCommand {
    /// Create the self-signed certificate authority
    Ca {
        #[arg(long)]
        name: Option<String>,
    },
    /// Generate the server certificate pair
    Server(ServerArgs),
    /// Generate a client certificate pair
    Client(ClientArgs),
}

#[derive(Debug, Args)]
struct ServerArgs {
    /// Alternative IP addresses
    #[arg(long, value_delimiter = ',', default_value = "127.0.0.1")]
    ips: Vec<IpAddr>,

    /// Alternative domain names
    #[arg(long, value_delimiter = ',')]
    domains: Vec<String>,
}

#[derive(Debug, Args)]
struct ClientArgs {
    /// Client name, used as the certificate common name
    name: Option<String>,

    /// Organization the client authenticates against
    #[arg(short = 'o', long)]
    organization: String,
}

#[derive(Debug, Subcommand)]
enum GetCommand {
    /// Print the CA certificate
    Ca,
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let log_level = std::env::var("LOG_LEVEL").unwrap_or_else(|_| "warn".to_string());
    service_core::observability::init_tracing("cert-store", &log_level, None)?;

    let pki_dir = cli
        .pki_dir
        .clone()
        .unwrap_or_else(|| default_data_dir().join("pki"));

    match cli.command {
        Command::Init(InitCommand::Ca { name }) => init_ca(&pki_dir, name.as_deref(), cli.force),
        Command::Init(InitCommand::Server(args)) => init_server(&pki_dir, args, cli.force),
        Command::Init(InitCommand::Client(args)) => init_client(&pki_dir, args, cli.force),
        Command::Get(GetCommand::Ca) => {
            let mut store = CertStore::new(&pki_dir, &[])?;
            store
                .load_ca(&[])
                .context("failed to load ca certificate")?;
            print!("{}", String::from_utf8_lossy(&store.ca_cert()?));
            Ok(())
        }
    }
}

fn init_ca(pki_dir: &Path, name: Option<&str>, force: bool) -> anyhow::Result<()> {
    let mut store = CertStore::new(pki_dir, &[])?;
    let names: Vec<&str> = name.into_iter().collect();
    let ca_name = name.unwrap_or(cert_store::DEFAULT_CA_NAME);

    if store.is_exists(ca_name) && !force {
        bail!(
            "CA certificate found at {}. Pass --force to overwrite",
            store.location().display()
        );
    }
    store
        .new_ca(&names)
        .context("failed to init ca")?;
    println!("Wrote ca certificates in {}", store.location().display());
    Ok(())
}

fn init_server(pki_dir: &Path, args: ServerArgs, force: bool) -> anyhow::Result<()> {
    let mut store = CertStore::new(pki_dir, &[])?;
    if store.is_exists("server") && !force {
        bail!(
            "Server certificate found at {}. Pass --force to overwrite",
            store.location().display()
        );
    }
    store
        .load_ca(&[])
        .context("failed to load ca certificate")?;

    let sans = AltNames {
        dns_names: args.domains,
        ips: args.ips,
    };
    let (crt, key) = store
        .new_server_cert_pair("server", &sans)
        .context("failed to generate certificate pair")?;
    store
        .write_bytes("server", &crt, &key)
        .context("failed to init server certificate pair")?;
    println!("Wrote server certificates in {}", store.location().display());
    Ok(())
}

fn init_client(pki_dir: &Path, args: ClientArgs, force: bool) -> anyhow::Result<()> {
    let org_key = args.organization.to_lowercase();
    let Some((_, org)) = SUPPORTED_ORGS.iter().find(|(key, _)| *key == org_key) else {
        bail!(
            "unknown organization `{}`, expected one of {}",
            args.organization,
            SUPPORTED_ORGS
                .iter()
                .map(|(_, display)| *display)
                .collect::<Vec<_>>()
                .join("/")
        );
    };

    let name = match (args.name, org_key.as_str()) {
        (Some(name), _) => name,
        (None, "gitlab") | (None, "azure") => org_key.clone(),
        (None, _) => bail!("missing client name"),
    };

    let organization = vec![org.to_string()];
    let mut store = CertStore::new(pki_dir, &organization)?;
    let file_name = format!("{}@{}", name, org_key);
    if store.is_exists(&file_name) && !force {
        bail!(
            "Client certificate found at {}. Pass --force to overwrite",
            store.location().display()
        );
    }
    store
        .load_ca(&[])
        .context("failed to load ca certificate")?;

    let (crt, key) = store
        .new_client_cert_pair(&name, &organization)
        .context("failed to generate certificate pair")?;
    store
        .write_bytes(&file_name, &crt, &key)
        .context("failed to init client certificate pair")?;
    println!("Wrote client certificates in {}", store.location().display());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn parses_server_flags() {
        let cli = Cli::parse_from([
            "cert-store",
            "--pki-dir",
            "/tmp/pki",
            "init",
            "server",
            "--ips",
            "10.0.0.1,127.0.0.1",
            "--domains",
            "guard.local",
        ]);
        match cli.command {
            Command::Init(InitCommand::Server(args)) => {
                assert_eq!(args.ips.len(), 2);
                assert_eq!(args.domains, ["guard.local"]);
            }
            other => panic!("unexpected command {:?}", other),
        }
    }

    #[test]
    fn client_pairs_cover_every_provider() {
        let tmp = tempfile::tempdir().unwrap();
        init_ca(tmp.path(), None, false).unwrap();

        for org in ["firebase", "Token", "github"] {
            let args = ClientArgs {
                name: Some("alice".to_string()),
                organization: org.to_string(),
            };
            init_client(tmp.path(), args, false).unwrap();
            let file = format!("alice@{}.crt", org.to_lowercase());
            assert!(tmp.path().join(file).exists());
        }

        let args = ClientArgs {
            name: Some("alice".to_string()),
            organization: "google".to_string(),
        };
        let err = init_client(tmp.path(), args, false).unwrap_err();
        assert!(err.to_string().contains("Azure/Firebase/Github/Gitlab/Token"));
    }
}
