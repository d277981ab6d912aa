/// Which end of the connection the decoder sits on.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub enum Role {
    Client,
    #[default]
    Server,
}

impl Role {
    #[must_use]
    pub fn is_client(self) -> bool { matches!(self, Role::Client) }

    #[must_use]
    pub fn is_server(self) -> bool { matches!(self, Role::Server) }
}
