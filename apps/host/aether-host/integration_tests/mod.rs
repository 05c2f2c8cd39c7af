mod host_loop;
