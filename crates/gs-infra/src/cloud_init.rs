use crate::types::ServerConfig;

const INSTALL_DIR: &str = "/opt/gameserver";

/// Container image used to run a given game type.
fn container_image(game_type: &str) -> &'static str {
    match game_type.to_ascii_lowercase().as_str() {
        "valheim" => "lloesche/valheim-server:latest",
        "terraria" => "ryshe/terraria:latest",
        "factorio" => "factoriotools/factorio:stable",
        _ => "itzg/minecraft-server:latest",
    }
}

/// `docker run --env-file` takes everything after `=` literally, one
/// variable per line, so only line breaks need removing.
fn env_value(raw: &str) -> String {
    raw.chars().filter(|c| !matches!(c, '\n' | '\r')).collect()
}

/// Generate cloud-init user data that installs Docker, opens the game port
/// and runs the server container under systemd.
///
/// The same script is handed to self-hosted operators to run by hand.
pub fn render(config: &ServerConfig) -> String {
    let port = config.port;
    let image = container_image(&config.game_type);

    let mut env_lines = format!(
        "      SERVER_NAME={}\n      GAME_TYPE={}\n      MAX_PLAYERS={}\n      GAME_MODE={}\n      DIFFICULTY={}\n      SERVER_PORT={port}\n      EULA=TRUE\n",
        env_value(&config.name),
        env_value(&config.game_type),
        config.max_players,
        env_value(&config.game_mode),
        env_value(&config.difficulty),
    );
    if let Some(seed) = &config.world_seed {
        env_lines.push_str(&format!("      SEED={}\n", env_value(seed)));
    }

    format!(
        r#"#cloud-config
package_update: true
packages:
  - docker.io
  - ufw
write_files:
  - path: {INSTALL_DIR}/server.env
    permissions: '0600'
    content: |
{env_lines}  - path: /etc/systemd/system/gameserver.service
    content: |
      [Unit]
      Description=Game server
      After=docker.service
      Requires=docker.service

      [Service]
      Restart=always
      ExecStartPre=-/usr/bin/docker rm -f gameserver
      ExecStart=/usr/bin/docker run --name gameserver --env-file {INSTALL_DIR}/server.env -p {port}:{port}/tcp -p {port}:{port}/udp -v {INSTALL_DIR}/data:/data {image}
      ExecStop=/usr/bin/docker stop gameserver

      [Install]
      WantedBy=multi-user.target
runcmd:
  - mkdir -p {INSTALL_DIR}/data
  - ufw allow 22/tcp
  - ufw allow {port}/tcp
  - ufw allow {port}/udp
  - ufw --force enable
  - systemctl enable --now docker
  - systemctl daemon-reload
  - systemctl enable --now gameserver
"#
    )
}
