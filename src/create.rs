//! Container creation: build the draft record from the commandline and
//! materialize the rootfs from the image.

use clap::Args;

use crate::container::state::{ContainerRecord, HOST, PRIVATE};
use crate::container::identity;
use crate::error::{Error, Result};
use crate::home::AppHome;
use crate::rootfs;

#[derive(Args, Debug)]
pub struct Create {
    /// Image reference to create the container from.
    pub image: String,
    /// Entrypoint; defaults to the image's command.
    #[arg(trailing_var_arg = true, allow_hyphen_values = true)]
    pub command: Vec<String>,
    /// Container name; generated when omitted.
    #[arg(long)]
    pub name: Option<String>,
    /// Hostname inside the container; defaults to the name.
    #[arg(long)]
    pub hostname: Option<String>,
    /// Environment variables, KEY=VALUE.
    #[arg(short, long = "env")]
    pub env: Vec<String>,
    /// Labels, key=value.
    #[arg(short, long = "label")]
    pub labels: Vec<String>,
    /// Working directory inside the container.
    #[arg(short, long, default_value = "/")]
    pub workdir: String,
    /// User to run as, uid[:gid].
    #[arg(short, long, default_value = "0:0")]
    pub user: String,
    /// User namespace mode: host or keep-id.
    #[arg(long, default_value = HOST)]
    pub userns: String,
    /// IPC namespace mode: private or host.
    #[arg(long, default_value = PRIVATE)]
    pub ipc: String,
    /// PID namespace mode: private or host.
    #[arg(long, default_value = PRIVATE)]
    pub pid: String,
    /// Cgroup namespace mode: private or host.
    #[arg(long, default_value = PRIVATE)]
    pub cgroup: String,
    /// Network mode: private or host.
    #[arg(long, default_value = PRIVATE)]
    pub network: String,
    /// UID map for keep-id, inside:outside:size.
    #[arg(long, default_value = "")]
    pub uidmap: String,
    /// GID map for keep-id, inside:outside:size.
    #[arg(long, default_value = "")]
    pub gidmap: String,
}

impl Create {
    pub fn exec(&self, home: &AppHome) -> Result<()> {
        let name = self
            .name
            .clone()
            .unwrap_or_else(identity::random_name);

        if identity::dir(home, &name).exists() {
            return Err(Error::InvalidInput(format!(
                "container {} already exists",
                name
            )));
        }

        let record = ContainerRecord {
            id: identity::resolve(home, &name),
            names: name.clone(),
            created: ContainerRecord::timestamp_now(),
            hostname: self.hostname.clone().unwrap_or_else(|| name.clone()),
            image: self.image.clone(),
            entrypoint: self.command.clone(),
            env: self.env.clone(),
            workdir: self.workdir.clone(),
            user: self.user.clone(),
            labels: self.labels.clone(),
            uidmap: String::new(),
            gidmap: String::new(),
            userns: self.userns.clone(),
            ipc: self.ipc.clone(),
            pid: self.pid.clone(),
            cgroup: self.cgroup.clone(),
            network: self.network.clone(),
            status: None,
            size: None,
        };

        rootfs::create_rootfs(home, &self.image, &name, record, &self.uidmap, &self.gidmap)?;

        println!("{}", identity::resolve(home, &name));
        Ok(())
    }
}
